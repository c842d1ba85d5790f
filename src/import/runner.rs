//! End-to-end execution of one claimed import job.
//!
//! The runner resolves the job's source file and destination, streams rows
//! through mapping into batched inserts, and persists progress counters at
//! every batch boundary. Failures split two ways: a batch-level insert error
//! is absorbed into the failed-row count and the run continues, while a fatal
//! error (missing file, unknown connection, unreachable destination) aborts
//! the job to `failed`.
//!
//! Between batches the runner re-reads the job's status; if another actor has
//! moved it out of `processing`, the run stops without writing a terminal
//! state over theirs.

use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;

use crate::import::batch::{BatchInserter, GROUPED_BATCH_SIZE, PLAIN_BATCH_SIZE};
use crate::import::destination::{DestinationDescriptor, DestinationError, DestinationHandle};
use crate::import::groups::{ExtractError, GroupExtractor, SourceRow};
use crate::import::jobs::{determine_status, ImportJob, JobStatus, JobStore};
use crate::import::mapper::ColumnMapping;
use crate::import::reader::{FileFormat, ReadError, TabularReader};
use crate::models::DestinationConnection;
use crate::storage::{FileStorage, StorageError};

/// Errors that abort a job before or during processing.
#[derive(Debug, Error)]
pub enum FatalJobError {
    #[error("{0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Read(#[from] ReadError),
    #[error("{0}")]
    Extract(#[from] ExtractError),
    #[error("unknown destination connection {0}")]
    UnknownConnection(i32),
    #[error("{0}")]
    Destination(#[from] DestinationError),
    #[error("no column mappings configured")]
    EmptyMapping,
    #[error("job metadata query failed: {0}")]
    Db(#[from] sqlx::Error),
}

/// Outcome of a completed (not aborted) run.
#[derive(Debug)]
pub struct RunOutcome {
    pub status: JobStatus,
    pub total: u64,
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
}

/// Executes claimed import jobs against their destination.
pub struct ImportRunner {
    pool: PgPool,
    store: JobStore,
    storage: FileStorage,
}

impl ImportRunner {
    pub fn new(pool: PgPool, storage: FileStorage) -> Self {
        let store = JobStore::new(pool.clone());
        Self { pool, store, storage }
    }

    /// Run `job` to a terminal state.
    ///
    /// Returns the outcome on a processed run (including partial and failed
    /// outcomes); a fatal error is returned to the caller, which records it
    /// on the job.
    pub async fn run(&self, job: &ImportJob) -> Result<Option<RunOutcome>, FatalJobError> {
        let path = self.storage.resolve_existing(&job.file_path)?;
        let format = FileFormat::parse(&job.file_type)?;

        let mapping = ColumnMapping::from_json(&job.column_mappings);
        if mapping.is_empty() {
            return Err(FatalJobError::EmptyMapping);
        }

        let connection = self.load_connection(job.connection_id).await?;
        let descriptor = DestinationDescriptor::from_catalog(&connection)?;
        let handle = descriptor.connect(Some(&job.database_name)).await?;

        let result = if job.is_grouped() {
            self.run_grouped(job, &path, format, &mapping, &handle).await
        } else {
            self.run_plain(job, &path, format, &mapping, &handle).await
        };

        handle.close().await;

        let outcome = match result? {
            Some(progress) => progress,
            None => return Ok(None), // cancelled mid-run
        };

        self.store
            .finish(
                job.id,
                outcome.status,
                outcome.total as i64,
                outcome.processed as i64,
                outcome.successful as i64,
                outcome.failed as i64,
            )
            .await?;

        Ok(Some(outcome))
    }

    /// Plain import: first row is the header, everything after is data.
    ///
    /// The file is scanned twice: a counting pass to set `total_rows` up
    /// front, then the streaming processing pass.
    async fn run_plain(
        &self,
        job: &ImportJob,
        path: &std::path::Path,
        format: FileFormat,
        mapping: &ColumnMapping,
        handle: &DestinationHandle,
    ) -> Result<Option<RunOutcome>, FatalJobError> {
        let total = count_data_rows(path, format)?;
        self.store.set_total_rows(job.id, total as i64).await?;
        log::info!("job {}: plain import of {} rows into {}", job.id, total, job.table_name);

        let columns = mapping.target_columns();
        let mut inserter =
            BatchInserter::new(handle, job.table_name.as_str(), columns, PLAIN_BATCH_SIZE);

        let mut headers: Option<Vec<String>> = None;
        let mut processed: u64 = 0;
        let now = Utc::now();

        let reader = TabularReader::open(path, format)?;
        for row in reader {
            let cells = row?;
            let header_row = match &headers {
                Some(h) => h,
                None => {
                    headers = Some(cells.iter().map(|c| c.trim().to_string()).collect());
                    continue;
                }
            };

            if cells.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }

            let source = zip_headers(header_row, &cells);
            let flushed = inserter.push(mapping.map_row(&source, now)).await;
            processed += 1;

            if flushed && !self.checkpoint(job.id, processed, &inserter).await? {
                log::warn!("job {}: cancelled after {} rows", job.id, processed);
                return Ok(None);
            }
        }

        inserter.flush().await;
        Ok(Some(outcome_of(total, processed, &inserter)))
    }

    /// Grouped import: extract all groups once, then import the rows of each
    /// selected group code through the shared mapping.
    async fn run_grouped(
        &self,
        job: &ImportJob,
        path: &std::path::Path,
        format: FileFormat,
        mapping: &ColumnMapping,
        handle: &DestinationHandle,
    ) -> Result<Option<RunOutcome>, FatalJobError> {
        let settings = job.settings();
        let extractor = GroupExtractor::with_defaults();
        let groups = extractor.extract_path(path, format)?;

        let selected: Vec<_> = groups
            .iter()
            .filter(|g| settings.group_codes.is_empty() || settings.group_codes.contains(&g.code))
            .collect();

        let total: u64 = selected.iter().map(|g| g.rows.len() as u64).sum();
        self.store.set_total_rows(job.id, total as i64).await?;
        log::info!(
            "job {}: grouped import of {} rows across {} groups into {}",
            job.id,
            total,
            selected.len(),
            job.table_name
        );

        let columns = mapping.target_columns();
        let mut inserter =
            BatchInserter::new(handle, job.table_name.as_str(), columns, GROUPED_BATCH_SIZE);

        let mut processed: u64 = 0;
        let now = Utc::now();

        for group in selected {
            log::debug!("job {}: importing group {} ({} rows)", job.id, group.code, group.rows.len());
            for row in &group.rows {
                let flushed = inserter.push(mapping.map_row(row, now)).await;
                processed += 1;

                if flushed && !self.checkpoint(job.id, processed, &inserter).await? {
                    log::warn!("job {}: cancelled after {} rows", job.id, processed);
                    return Ok(None);
                }
            }
        }

        inserter.flush().await;
        Ok(Some(outcome_of(total, processed, &inserter)))
    }

    /// Persist progress and confirm the job is still ours. Returns false when
    /// another actor has moved the job out of `processing`.
    async fn checkpoint(
        &self,
        job_id: i32,
        processed: u64,
        inserter: &BatchInserter<'_>,
    ) -> Result<bool, FatalJobError> {
        self.store
            .update_progress(
                job_id,
                processed as i64,
                inserter.successful() as i64,
                inserter.failed() as i64,
            )
            .await?;

        match self.store.status_of(job_id).await? {
            Some(JobStatus::Processing) => Ok(true),
            _ => Ok(false),
        }
    }

    async fn load_connection(&self, id: i32) -> Result<DestinationConnection, FatalJobError> {
        let connection: Option<DestinationConnection> = sqlx::query_as(
            "SELECT id, name, driver, host, port, username, password, database_name, created_at
             FROM destination_connections WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        connection.ok_or(FatalJobError::UnknownConnection(id))
    }
}

fn outcome_of(total: u64, processed: u64, inserter: &BatchInserter<'_>) -> RunOutcome {
    let successful = inserter.successful();
    let failed = inserter.failed();
    RunOutcome {
        status: determine_status(successful, failed, total),
        total,
        processed,
        successful,
        failed,
    }
}

/// Key the cells of one data row by header name, positional fallback for
/// cells past the header row's width.
fn zip_headers(headers: &[String], cells: &[String]) -> SourceRow {
    let mut row = SourceRow::with_capacity(cells.len());
    for (index, cell) in cells.iter().enumerate() {
        let key = headers
            .get(index)
            .filter(|h| !h.is_empty())
            .cloned()
            .unwrap_or_else(|| index.to_string());
        row.insert(key, cell.clone());
    }
    row
}

/// Count non-empty data rows (header excluded) in one cheap pass.
fn count_data_rows(path: &std::path::Path, format: FileFormat) -> Result<u64, ReadError> {
    let reader = TabularReader::open(path, format)?;
    let mut count: u64 = 0;
    for (index, row) in reader.enumerate() {
        let cells = row?;
        if index == 0 {
            continue;
        }
        if !cells.iter().all(|cell| cell.trim().is_empty()) {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn counts_data_rows_excluding_header_and_blanks() {
        let file = csv_file("a,b\n1,2\n,,\n3,4\n");
        assert_eq!(count_data_rows(file.path(), FileFormat::Csv).unwrap(), 2);
    }

    #[test]
    fn zip_headers_uses_positional_fallback() {
        let headers = vec!["Name".to_string(), String::new()];
        let cells = vec!["alice".to_string(), "x".to_string(), "y".to_string()];
        let row = zip_headers(&headers, &cells);
        assert_eq!(row.get("Name").unwrap(), "alice");
        assert_eq!(row.get("1").unwrap(), "x");
        assert_eq!(row.get("2").unwrap(), "y");
    }
}
