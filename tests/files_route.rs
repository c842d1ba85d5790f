//! File inspection routes exercised against real files in a temporary
//! storage root. No database is involved.

use import_server::routes::files::{
    file_groups, file_headers, file_sample, group_columns, group_sample, FileHeadersResponse,
    FileSampleResponse, GroupColumnsResponse, GroupSampleResponse, GroupSummaryResponse,
};
use import_server::storage::FileStorage;
use import_server::test_support::TestRocketBuilder;
use rocket::http::Status;
use rocket::local::blocking::Client;
use rocket::routes;
use std::io::Write;
use tempfile::TempDir;

const GROUPED_CSV: &str = "\
Loan Type: 100-Agricultural Loans,,\n\
Customer Name,Principal Balance,Maturity Date\n\
alice,1000,31/01/2024\n\
bob,2000,28/02/2024\n\
Loan Type: 200-Commercial Loans,,\n\
Customer Name,Principal Balance,Maturity Date\n\
carol,3000,31/03/2024\n";

const PLAIN_CSV: &str = "\
Customer Name,Principal Balance\n\
alice,1000\n\
bob,2000\n\
carol,3000\n";

fn storage_with(files: &[(&str, &str)]) -> (TempDir, FileStorage) {
    let dir = tempfile::tempdir().expect("create temp storage");
    for (name, contents) in files {
        let mut file = std::fs::File::create(dir.path().join(name)).expect("create file");
        file.write_all(contents.as_bytes()).expect("write file");
    }
    let storage = FileStorage::new(dir.path());
    (dir, storage)
}

fn client_with(storage: FileStorage) -> Client {
    TestRocketBuilder::new()
        .manage_storage(storage)
        .mount_api_routes(routes![
            file_headers,
            file_sample,
            file_groups,
            group_columns,
            group_sample
        ])
        .blocking_client()
}

#[test]
fn headers_and_sample_of_a_plain_file() {
    let (_dir, storage) = storage_with(&[("loans.csv", PLAIN_CSV)]);
    let client = client_with(storage);

    let response = client
        .get("/api/v1/files/headers?path=loans.csv&file_type=csv")
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let payload: FileHeadersResponse = response.into_json().expect("valid JSON");
    assert_eq!(payload.headers, vec!["Customer Name", "Principal Balance"]);

    let response = client
        .get("/api/v1/files/sample?path=loans.csv&file_type=csv&n=2")
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let payload: FileSampleResponse = response.into_json().expect("valid JSON");
    assert_eq!(payload.rows.len(), 2);
    assert_eq!(payload.rows[0], vec!["alice", "1000"]);
}

#[test]
fn unsupported_file_type_is_a_bad_request() {
    let (_dir, storage) = storage_with(&[("loans.csv", PLAIN_CSV)]);
    let client = client_with(storage);

    let response = client
        .get("/api/v1/files/headers?path=loans.csv&file_type=pdf")
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);
}

#[test]
fn missing_file_is_not_found() {
    let (_dir, storage) = storage_with(&[]);
    let client = client_with(storage);

    let response = client
        .get("/api/v1/files/headers?path=absent.csv&file_type=csv")
        .dispatch();
    assert_eq!(response.status(), Status::NotFound);
}

#[test]
fn groups_of_a_section_marked_file() {
    let (_dir, storage) = storage_with(&[("grouped.csv", GROUPED_CSV)]);
    let client = client_with(storage);

    let response = client
        .get("/api/v1/files/groups?path=grouped.csv&file_type=csv")
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let payload: Vec<GroupSummaryResponse> = response.into_json().expect("valid JSON");
    assert_eq!(payload.len(), 2);
    assert_eq!(payload[0].code, "100");
    assert_eq!(payload[0].name, "Agricultural Loans");
    assert_eq!(payload[0].row_count, 2);
    assert_eq!(payload[1].code, "200");
    assert_eq!(payload[1].row_count, 1);
}

#[test]
fn a_flat_file_has_no_groups() {
    let (_dir, storage) = storage_with(&[("loans.csv", PLAIN_CSV)]);
    let client = client_with(storage);

    let response = client
        .get("/api/v1/files/groups?path=loans.csv&file_type=csv")
        .dispatch();
    assert_eq!(response.status(), Status::NotFound);
}

#[test]
fn group_columns_and_sample_by_code() {
    let (_dir, storage) = storage_with(&[("grouped.csv", GROUPED_CSV)]);
    let client = client_with(storage);

    let response = client
        .get("/api/v1/files/groups/100/columns?path=grouped.csv&file_type=csv")
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let payload: GroupColumnsResponse = response.into_json().expect("valid JSON");
    assert_eq!(
        payload.columns,
        vec!["Customer Name", "Principal Balance", "Maturity Date"]
    );

    let response = client
        .get("/api/v1/files/groups/200/sample?path=grouped.csv&file_type=csv&n=5")
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let payload: GroupSampleResponse = response.into_json().expect("valid JSON");
    assert_eq!(payload.rows.len(), 1);
    assert_eq!(payload.rows[0].get("Customer Name").unwrap(), "carol");
    assert_eq!(payload.rows[0].get("group_code").unwrap(), "200");

    let response = client
        .get("/api/v1/files/groups/999/columns?path=grouped.csv&file_type=csv")
        .dispatch();
    assert_eq!(response.status(), Status::NotFound);
}
