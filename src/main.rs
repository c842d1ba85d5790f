use rocket::launch;

#[launch]
fn rocket() -> _ {
    import_server::rocket()
}
