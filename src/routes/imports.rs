//! Import job submission and status.
//!
//! Submission validates the request, stores a `pending` job, and returns the
//! id immediately; the background worker picks the job up from there. Status
//! reads come straight from the job record, so counters reflect the last
//! persisted batch boundary.

use chrono::{DateTime, Utc};
use rocket::serde::json::Json;
use rocket::State;
use rocket_db_pools::sqlx::{self, PgPool};
use rocket_okapi::okapi::schemars::{self, JsonSchema};
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ApiError;
use crate::import::jobs::{ImportJob, JobStatus, JobStore, NewImportJob};
use crate::import::mapper::ColumnMapping;
use crate::import::reader::FileFormat;
use crate::storage::FileStorage;

const DEFAULT_LIST_LIMIT: i64 = 50;

/// A plain import request: load the file's rows into one destination table.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct StartImportRequest {
    pub connection_id: i32,
    pub database_name: String,
    pub table_name: String,
    pub file_name: String,
    /// Path relative to the storage root.
    pub file_path: String,
    pub file_type: String,
    /// Source column name to destination column name. An empty destination
    /// skips the source column.
    pub column_mappings: HashMap<String, String>,
}

/// A grouped import request: the shared mapping is applied to every selected
/// group's rows. An empty `group_codes` list selects all groups.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct StartGroupedImportRequest {
    #[serde(flatten)]
    pub import: StartImportRequest,
    #[serde(default)]
    pub group_codes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StartImportResponse {
    pub job_id: i32,
    pub status: JobStatus,
}

/// Status and counters of one import job.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ImportJobResponse {
    pub id: i32,
    pub connection_id: i32,
    pub database_name: String,
    pub table_name: String,
    pub file_name: String,
    pub status: JobStatus,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub successful_rows: i64,
    pub failed_rows: i64,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ImportJob> for ImportJobResponse {
    fn from(job: ImportJob) -> Self {
        Self {
            id: job.id,
            connection_id: job.connection_id,
            database_name: job.database_name,
            table_name: job.table_name,
            file_name: job.file_name,
            status: job.status,
            total_rows: job.total_rows,
            processed_rows: job.processed_rows,
            successful_rows: job.successful_rows,
            failed_rows: job.failed_rows,
            error_message: job.error_message,
            started_at: job.started_at,
            completed_at: job.completed_at,
            created_at: job.created_at,
        }
    }
}

async fn validate_and_enqueue(
    pool: &PgPool,
    storage: &FileStorage,
    request: &StartImportRequest,
    import_settings: Option<serde_json::Value>,
) -> Result<i32, ApiError> {
    FileFormat::parse(&request.file_type)?;
    storage.resolve_existing(&request.file_path)?;

    let mapping = ColumnMapping::from_json(&serde_json::json!(request.column_mappings));
    if mapping.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one column mapping is required".to_string(),
        ));
    }

    let exists: Option<(i32,)> =
        sqlx::query_as("SELECT id FROM destination_connections WHERE id = $1")
            .bind(request.connection_id)
            .fetch_optional(pool)
            .await?;
    if exists.is_none() {
        return Err(ApiError::NotFound(format!(
            "destination connection {} not found",
            request.connection_id
        )));
    }

    let store = JobStore::new(pool.clone());
    let job_id = store
        .create(&NewImportJob {
            connection_id: request.connection_id,
            database_name: request.database_name.clone(),
            table_name: request.table_name.clone(),
            file_name: request.file_name.clone(),
            file_path: request.file_path.clone(),
            file_type: request.file_type.clone(),
            column_mappings: serde_json::json!(request.column_mappings),
            import_settings,
        })
        .await?;

    log::info!(
        "enqueued import job {} ({} -> {}.{})",
        job_id,
        request.file_name,
        request.database_name,
        request.table_name
    );

    Ok(job_id)
}

/// Enqueue a plain import job.
#[openapi(tag = "Imports")]
#[post("/imports", data = "<request>")]
pub async fn start_import(
    request: Json<StartImportRequest>,
    pool: &State<PgPool>,
    storage: &State<FileStorage>,
) -> Result<Json<StartImportResponse>, ApiError> {
    let job_id = validate_and_enqueue(pool.inner(), storage, &request.0, None).await?;
    Ok(Json(StartImportResponse {
        job_id,
        status: JobStatus::Pending,
    }))
}

/// Enqueue a grouped import job for the selected group codes.
#[openapi(tag = "Imports")]
#[post("/imports/grouped", data = "<request>")]
pub async fn start_grouped_import(
    request: Json<StartGroupedImportRequest>,
    pool: &State<PgPool>,
    storage: &State<FileStorage>,
) -> Result<Json<StartImportResponse>, ApiError> {
    let settings = serde_json::json!({
        "is_grouped_import": true,
        "group_codes": request.group_codes,
    });
    let job_id =
        validate_and_enqueue(pool.inner(), storage, &request.import, Some(settings)).await?;
    Ok(Json(StartImportResponse {
        job_id,
        status: JobStatus::Pending,
    }))
}

/// Status of one import job.
#[openapi(tag = "Imports")]
#[get("/imports/<id>")]
pub async fn get_import(
    id: i32,
    pool: &State<PgPool>,
) -> Result<Json<ImportJobResponse>, ApiError> {
    let store = JobStore::new(pool.inner().clone());
    let job = store
        .find(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("import job {} not found", id)))?;
    Ok(Json(job.into()))
}

/// Recently created import jobs, newest first.
#[openapi(tag = "Imports")]
#[get("/imports?<limit>")]
pub async fn list_imports(
    limit: Option<i64>,
    pool: &State<PgPool>,
) -> Result<Json<Vec<ImportJobResponse>>, ApiError> {
    let store = JobStore::new(pool.inner().clone());
    let jobs = store
        .recent(limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500))
        .await?;
    Ok(Json(jobs.into_iter().map(Into::into).collect()))
}
