//! End-to-end import flows against a disposable Postgres container.
//!
//! The container doubles as the application database and the import
//! destination: jobs are stored in it, and the destination connection
//! registered in the catalog points back at the same server.

use chrono::NaiveDate;
use import_server::import::jobs::{JobStatus, JobStore, NewImportJob};
use import_server::import::runner::ImportRunner;
use import_server::routes::imports::{
    get_import, list_imports, start_grouped_import, start_import, ImportJobResponse,
    StartImportResponse,
};
use import_server::storage::FileStorage;
use import_server::test_support::{TestDatabase, TestRocketBuilder};
use rocket::http::{ContentType, Status};
use rocket::routes;
use rocket_db_pools::sqlx::{self, PgPool};
use std::io::Write;
use tempfile::TempDir;

async fn register_destination(pool: &PgPool, db: &TestDatabase) -> i32 {
    sqlx::query_scalar(
        "INSERT INTO destination_connections
         (name, driver, host, port, username, password, database_name)
         VALUES ($1, 'pgsql', $2, $3, 'postgres', 'postgres', $4)
         RETURNING id",
    )
    .bind("test destination")
    .bind(db.host())
    .bind(db.port() as i32)
    .bind(db.database_name())
    .fetch_one(pool)
    .await
    .expect("failed to register destination connection")
}

async fn create_loans_table(pool: &PgPool) {
    sqlx::query(
        "CREATE TABLE loans (
             id SERIAL PRIMARY KEY,
             customer_name TEXT,
             principal_balance DOUBLE PRECISION,
             maturity_date DATE,
             loan_type_code TEXT,
             created_at TIMESTAMPTZ,
             updated_at TIMESTAMPTZ
         )",
    )
    .execute(pool)
    .await
    .expect("failed to create loans table");
}

fn storage_with(files: &[(&str, &str)]) -> (TempDir, FileStorage) {
    let dir = tempfile::tempdir().expect("create temp storage");
    for (name, contents) in files {
        let mut file = std::fs::File::create(dir.path().join(name)).expect("create file");
        file.write_all(contents.as_bytes()).expect("write file");
    }
    let storage = FileStorage::new(dir.path());
    (dir, storage)
}

fn plain_job(connection_id: i32, db_name: &str, mappings: serde_json::Value) -> NewImportJob {
    NewImportJob {
        connection_id,
        database_name: db_name.to_string(),
        table_name: "loans".to_string(),
        file_name: "loans.csv".to_string(),
        file_path: "loans.csv".to_string(),
        file_type: "csv".to_string(),
        column_mappings: mappings,
        import_settings: None,
    }
}

#[tokio::test]
async fn plain_import_runs_to_completion() {
    let test_db = TestDatabase::new().await.expect("provision test database");
    let pool = test_db.pool_clone();

    let connection_id = register_destination(&pool, &test_db).await;
    create_loans_table(&pool).await;

    let csv = "\
Customer Name,Principal Balance,Maturity Date\n\
alice,\"$1,000.50\",31/01/2024\n\
bob,2000,28/02/2024\n\
carol,3000,31/03/2024\n";
    let (_dir, storage) = storage_with(&[("loans.csv", csv)]);

    let mappings = serde_json::json!({
        "Customer Name": "customer_name",
        "Principal Balance": "principal_balance",
        "Maturity Date": "maturity_date",
    });

    let store = JobStore::new(pool.clone());
    let job_id = store
        .create(&plain_job(connection_id, test_db.database_name(), mappings))
        .await
        .expect("create job");

    let job = store
        .claim_next()
        .await
        .expect("claim job")
        .expect("a pending job exists");
    assert_eq!(job.id, job_id);
    assert_eq!(job.status, JobStatus::Processing);

    let runner = ImportRunner::new(pool.clone(), storage);
    let outcome = runner
        .run(&job)
        .await
        .expect("run job")
        .expect("job not cancelled");
    assert_eq!(outcome.status, JobStatus::Completed);
    assert_eq!(outcome.total, 3);
    assert_eq!(outcome.successful, 3);
    assert_eq!(outcome.failed, 0);

    let finished = store.find(job_id).await.expect("find job").expect("job exists");
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.successful_rows, 3);
    assert!(finished.completed_at.is_some());

    let (name, balance, maturity): (String, f64, NaiveDate) = sqlx::query_as(
        "SELECT customer_name, principal_balance, maturity_date
         FROM loans WHERE customer_name = 'alice'",
    )
    .fetch_one(&pool)
    .await
    .expect("imported row exists");
    assert_eq!(name, "alice");
    assert_eq!(balance, 1000.50);
    assert_eq!(maturity, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());

    test_db.close().await.expect("drop test database");
}

#[tokio::test]
async fn grouped_import_loads_only_selected_codes() {
    let test_db = TestDatabase::new().await.expect("provision test database");
    let pool = test_db.pool_clone();

    let connection_id = register_destination(&pool, &test_db).await;
    create_loans_table(&pool).await;

    let csv = "\
Loan Type: 100-Agricultural Loans,,\n\
Customer Name,Principal Balance,Maturity Date\n\
alice,1000,31/01/2024\n\
bob,2000,28/02/2024\n\
Loan Type: 200-Commercial Loans,,\n\
Customer Name,Principal Balance,Maturity Date\n\
carol,3000,31/03/2024\n";
    let (_dir, storage) = storage_with(&[("loans.csv", csv)]);

    let mappings = serde_json::json!({
        "Customer Name": "customer_name",
        "Principal Balance": "principal_balance",
        "group_code": "loan_type_code",
    });

    let mut job = plain_job(connection_id, test_db.database_name(), mappings);
    job.import_settings = Some(serde_json::json!({
        "is_grouped_import": true,
        "group_codes": ["100"],
    }));

    let store = JobStore::new(pool.clone());
    store.create(&job).await.expect("create job");
    let claimed = store
        .claim_next()
        .await
        .expect("claim job")
        .expect("a pending job exists");

    let runner = ImportRunner::new(pool.clone(), storage);
    let outcome = runner
        .run(&claimed)
        .await
        .expect("run job")
        .expect("job not cancelled");
    assert_eq!(outcome.status, JobStatus::Completed);
    assert_eq!(outcome.total, 2);
    assert_eq!(outcome.successful, 2);

    let codes: Vec<(String, String)> =
        sqlx::query_as("SELECT customer_name, loan_type_code FROM loans ORDER BY customer_name")
            .fetch_all(&pool)
            .await
            .expect("query imported rows");
    assert_eq!(codes.len(), 2);
    assert!(codes.iter().all(|(_, code)| code == "100"));
    assert!(codes.iter().any(|(name, _)| name == "alice"));

    test_db.close().await.expect("drop test database");
}

#[tokio::test]
async fn failed_batch_yields_partial_status() {
    let test_db = TestDatabase::new().await.expect("provision test database");
    let pool = test_db.pool_clone();

    let connection_id = register_destination(&pool, &test_db).await;
    sqlx::query(
        "CREATE TABLE loans (
             id SERIAL PRIMARY KEY,
             customer_name TEXT,
             maturity_date DATE NOT NULL,
             created_at TIMESTAMPTZ,
             updated_at TIMESTAMPTZ
         )",
    )
    .execute(&pool)
    .await
    .expect("create loans table");

    // 1000 valid rows fill and flush the first batch; the unparsable date in
    // the final row becomes NULL and violates NOT NULL in the last batch.
    let mut csv = String::from("Customer Name,Maturity Date\n");
    for i in 0..1000 {
        csv.push_str(&format!("customer-{},15/06/2024\n", i));
    }
    csv.push_str("broken,not-a-date\n");
    let (_dir, storage) = storage_with(&[("loans.csv", &csv)]);

    let mappings = serde_json::json!({
        "Customer Name": "customer_name",
        "Maturity Date": "maturity_date",
    });

    let store = JobStore::new(pool.clone());
    store
        .create(&plain_job(connection_id, test_db.database_name(), mappings))
        .await
        .expect("create job");
    let claimed = store
        .claim_next()
        .await
        .expect("claim job")
        .expect("a pending job exists");

    let runner = ImportRunner::new(pool.clone(), storage);
    let outcome = runner
        .run(&claimed)
        .await
        .expect("run job")
        .expect("job not cancelled");

    assert_eq!(outcome.status, JobStatus::Partial);
    assert_eq!(outcome.total, 1001);
    assert_eq!(outcome.successful, 1000);
    assert_eq!(outcome.failed, 1);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM loans")
        .fetch_one(&pool)
        .await
        .expect("count rows");
    assert_eq!(count, 1000);

    test_db.close().await.expect("drop test database");
}

#[tokio::test]
async fn jobs_are_claimed_oldest_first() {
    let test_db = TestDatabase::new().await.expect("provision test database");
    let pool = test_db.pool_clone();

    let connection_id = register_destination(&pool, &test_db).await;
    let mappings = serde_json::json!({"Customer Name": "customer_name"});

    let store = JobStore::new(pool.clone());
    let first = store
        .create(&plain_job(connection_id, test_db.database_name(), mappings.clone()))
        .await
        .expect("create first job");
    let second = store
        .create(&plain_job(connection_id, test_db.database_name(), mappings))
        .await
        .expect("create second job");

    let claimed = store
        .claim_next()
        .await
        .expect("claim")
        .expect("a pending job exists");
    assert_eq!(claimed.id, first);
    assert!(claimed.started_at.is_some());

    let claimed = store
        .claim_next()
        .await
        .expect("claim")
        .expect("another pending job exists");
    assert_eq!(claimed.id, second);

    assert!(store.claim_next().await.expect("claim").is_none());

    test_db.close().await.expect("drop test database");
}

#[tokio::test]
async fn import_routes_enqueue_and_report_jobs() {
    let test_db = TestDatabase::new().await.expect("provision test database");
    let pool = test_db.pool_clone();

    let connection_id = register_destination(&pool, &test_db).await;

    let csv = "Customer Name,Principal Balance\nalice,1000\n";
    let (_dir, storage) = storage_with(&[("loans.csv", csv)]);

    let client = TestRocketBuilder::new()
        .manage_pg_pool(pool.clone())
        .manage_storage(storage)
        .mount_api_routes(routes![
            start_import,
            start_grouped_import,
            get_import,
            list_imports
        ])
        .async_client()
        .await;

    let body = serde_json::json!({
        "connection_id": connection_id,
        "database_name": test_db.database_name(),
        "table_name": "loans",
        "file_name": "loans.csv",
        "file_path": "loans.csv",
        "file_type": "csv",
        "column_mappings": {"Customer Name": "customer_name"},
    });

    {
        let response = client
            .post("/api/v1/imports")
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let payload: StartImportResponse = response.into_json().await.expect("valid JSON");
        assert_eq!(payload.status, JobStatus::Pending);

        let response = client
            .get(format!("/api/v1/imports/{}", payload.job_id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let job: ImportJobResponse = response.into_json().await.expect("valid JSON");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.table_name, "loans");

        let response = client.get("/api/v1/imports").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let jobs: Vec<ImportJobResponse> = response.into_json().await.expect("valid JSON");
        assert_eq!(jobs.len(), 1);

        // Unknown destination connection is rejected up front.
        let mut bad = body.clone();
        bad["connection_id"] = serde_json::json!(999_999);
        let response = client
            .post("/api/v1/imports")
            .header(ContentType::JSON)
            .body(bad.to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);

        // Empty mapping is rejected up front.
        let mut bad = body.clone();
        bad["column_mappings"] = serde_json::json!({});
        let response = client
            .post("/api/v1/imports")
            .header(ContentType::JSON)
            .body(bad.to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);

}
    drop(client);
    test_db.close().await.expect("drop test database");
}
