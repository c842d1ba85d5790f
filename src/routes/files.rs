//! Inspection of uploaded tabular files: headers, sample rows, and the
//! record groups of section-marked files.
//!
//! File parsing is synchronous I/O, so every handler runs it on the blocking
//! thread pool. Paths are relative to the storage root and validated against
//! parent traversal before anything is opened.

use rocket::serde::json::Json;
use rocket::tokio::task;
use rocket::State;
use rocket_okapi::okapi::schemars::{self, JsonSchema};
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ApiError;
use crate::import::groups::{GroupExtractor, SourceRow};
use crate::import::reader::{self, FileFormat};
use crate::storage::FileStorage;

const DEFAULT_SAMPLE_ROWS: usize = 5;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FileHeadersResponse {
    pub headers: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FileSampleResponse {
    pub rows: Vec<Vec<String>>,
}

/// Summary of one record group found in a section-marked file.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GroupSummaryResponse {
    pub code: String,
    pub name: String,
    pub full: String,
    pub row_count: usize,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GroupColumnsResponse {
    pub code: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GroupSampleResponse {
    pub code: String,
    pub rows: Vec<SourceRow>,
}

fn resolve(storage: &FileStorage, path: &str, file_type: &str) -> Result<(PathBuf, FileFormat), ApiError> {
    let format = FileFormat::parse(file_type)?;
    let resolved = storage.resolve_existing(path)?;
    Ok((resolved, format))
}

async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::InternalError(format!("file task panicked: {}", e)))?
}

/// Column headers of an uploaded file (its first row).
#[openapi(tag = "Files")]
#[get("/files/headers?<path>&<file_type>")]
pub async fn file_headers(
    path: String,
    file_type: String,
    storage: &State<FileStorage>,
) -> Result<Json<FileHeadersResponse>, ApiError> {
    let (resolved, format) = resolve(storage, &path, &file_type)?;
    let headers =
        run_blocking(move || Ok(reader::file_headers(&resolved, format)?)).await?;
    Ok(Json(FileHeadersResponse { headers }))
}

/// First data rows of an uploaded file, header row excluded.
#[openapi(tag = "Files")]
#[get("/files/sample?<path>&<file_type>&<n>")]
pub async fn file_sample(
    path: String,
    file_type: String,
    n: Option<usize>,
    storage: &State<FileStorage>,
) -> Result<Json<FileSampleResponse>, ApiError> {
    let (resolved, format) = resolve(storage, &path, &file_type)?;
    let n = n.unwrap_or(DEFAULT_SAMPLE_ROWS);
    let rows = run_blocking(move || Ok(reader::file_sample(&resolved, format, n)?)).await?;
    Ok(Json(FileSampleResponse { rows }))
}

/// Record groups found in a section-marked file, in file order.
#[openapi(tag = "Files")]
#[get("/files/groups?<path>&<file_type>")]
pub async fn file_groups(
    path: String,
    file_type: String,
    storage: &State<FileStorage>,
) -> Result<Json<Vec<GroupSummaryResponse>>, ApiError> {
    let (resolved, format) = resolve(storage, &path, &file_type)?;
    let summaries = run_blocking(move || {
        let extractor = GroupExtractor::with_defaults();
        Ok(extractor.group_summaries(&resolved, format)?)
    })
    .await?;

    if summaries.is_empty() {
        return Err(ApiError::NotFound("no groups found in file".to_string()));
    }

    Ok(Json(
        summaries
            .into_iter()
            .map(|s| GroupSummaryResponse {
                code: s.code,
                name: s.name,
                full: s.full,
                row_count: s.row_count,
            })
            .collect(),
    ))
}

/// Column headers of one group of a section-marked file.
#[openapi(tag = "Files")]
#[get("/files/groups/<code>/columns?<path>&<file_type>")]
pub async fn group_columns(
    code: String,
    path: String,
    file_type: String,
    storage: &State<FileStorage>,
) -> Result<Json<GroupColumnsResponse>, ApiError> {
    let (resolved, format) = resolve(storage, &path, &file_type)?;
    let lookup = code.clone();
    let columns = run_blocking(move || {
        let extractor = GroupExtractor::with_defaults();
        Ok(extractor.group_columns(&resolved, format, &lookup)?)
    })
    .await?;

    if columns.is_empty() {
        return Err(ApiError::NotFound(format!("group '{}' not found", code)));
    }

    Ok(Json(GroupColumnsResponse { code, columns }))
}

/// First data rows of one group of a section-marked file.
#[openapi(tag = "Files")]
#[get("/files/groups/<code>/sample?<path>&<file_type>&<n>")]
pub async fn group_sample(
    code: String,
    path: String,
    file_type: String,
    n: Option<usize>,
    storage: &State<FileStorage>,
) -> Result<Json<GroupSampleResponse>, ApiError> {
    let (resolved, format) = resolve(storage, &path, &file_type)?;
    let n = n.unwrap_or(DEFAULT_SAMPLE_ROWS);
    let lookup = code.clone();
    let rows = run_blocking(move || {
        let extractor = GroupExtractor::with_defaults();
        Ok(extractor.group_sample(&resolved, format, &lookup, n)?)
    })
    .await?;

    if rows.is_empty() {
        return Err(ApiError::NotFound(format!("group '{}' not found", code)));
    }

    Ok(Json(GroupSampleResponse { code, rows }))
}
