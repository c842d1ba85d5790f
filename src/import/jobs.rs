//! Import job records, status transitions, and queue claiming.
//!
//! Jobs are created `pending` and claimed by the background worker with
//! `FOR UPDATE SKIP LOCKED`, so several server instances can share one
//! metadata database without double-running a job. Once a job is claimed its
//! record is mutated only by the worker that owns it; the HTTP layer reads
//! status and counters but never writes them.

use chrono::{DateTime, Utc};
use rocket_okapi::okapi::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Lifecycle of an import job.
///
/// `pending → processing → {completed | partial | failed}`; the three
/// right-hand states are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "import_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Partial,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Partial | JobStatus::Failed)
    }
}

/// Pick the terminal status from the final counters.
///
/// A clean run completes (including a zero-row one); a mix of successes and
/// failures is partial; no successes against a non-empty input is a failure.
/// A fully successful run whose `total` drifted (rows skipped before mapping)
/// still counts as completed.
pub fn determine_status(successful: u64, failed: u64, total: u64) -> JobStatus {
    if failed == 0 && successful == total {
        JobStatus::Completed
    } else if successful > 0 && failed > 0 {
        JobStatus::Partial
    } else if successful > 0 {
        JobStatus::Completed
    } else {
        JobStatus::Failed
    }
}

/// Grouped-mode settings stored in the job's `import_settings` JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ImportSettings {
    #[serde(default)]
    pub is_grouped_import: bool,
    /// Group codes selected for import; the single column mapping is applied
    /// to every one of them.
    #[serde(default)]
    pub group_codes: Vec<String>,
}

/// A persisted import job.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImportJob {
    pub id: i32,
    pub connection_id: i32,
    pub database_name: String,
    pub table_name: String,
    pub file_name: String,
    pub file_path: String,
    pub file_type: String,
    pub column_mappings: serde_json::Value,
    pub import_settings: Option<serde_json::Value>,
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

impl ImportJob {
    pub fn settings(&self) -> ImportSettings {
        self.import_settings
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }

    pub fn is_grouped(&self) -> bool {
        self.settings().is_grouped_import
    }
}

/// Fields needed to enqueue a new job.
#[derive(Debug, Clone)]
pub struct NewImportJob {
    pub connection_id: i32,
    pub database_name: String,
    pub table_name: String,
    pub file_name: String,
    pub file_path: String,
    pub file_type: String,
    pub column_mappings: serde_json::Value,
    pub import_settings: Option<serde_json::Value>,
}

const JOB_COLUMNS: &str = "id, connection_id, database_name, table_name, file_name, file_path, \
     file_type, column_mappings, import_settings, status, total_rows, processed_rows, \
     successful_rows, failed_rows, error_message, started_at, completed_at, created_at";

/// CRUD and queue operations over `import_jobs`.
pub struct JobStore {
    pool: PgPool,
}

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a job in `pending` state, returning its id.
    pub async fn create(&self, job: &NewImportJob) -> Result<i32, sqlx::Error> {
        let (id,): (i32,) = sqlx::query_as(
            r#"INSERT INTO import_jobs
               (connection_id, database_name, table_name, file_name, file_path, file_type,
                column_mappings, import_settings, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending')
               RETURNING id"#,
        )
        .bind(job.connection_id)
        .bind(&job.database_name)
        .bind(&job.table_name)
        .bind(&job.file_name)
        .bind(&job.file_path)
        .bind(&job.file_type)
        .bind(&job.column_mappings)
        .bind(&job.import_settings)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Atomically claim the oldest pending job and move it to `processing`.
    pub async fn claim_next(&self) -> Result<Option<ImportJob>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let claimed: Option<(i32,)> = sqlx::query_as(
            r#"SELECT id FROM import_jobs
               WHERE status = 'pending'
               ORDER BY created_at ASC, id ASC
               LIMIT 1
               FOR UPDATE SKIP LOCKED"#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id,)) = claimed else {
            tx.rollback().await?;
            return Ok(None);
        };

        let job: ImportJob = sqlx::query_as(&format!(
            "UPDATE import_jobs
             SET status = 'processing', started_at = NOW()
             WHERE id = $1
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(job))
    }

    pub async fn find(&self, id: i32) -> Result<Option<ImportJob>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM import_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Most recently created jobs, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<ImportJob>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM import_jobs ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Current status only, used for the batch-boundary cancellation check.
    pub async fn status_of(&self, id: i32) -> Result<Option<JobStatus>, sqlx::Error> {
        let status: Option<(JobStatus,)> =
            sqlx::query_as("SELECT status FROM import_jobs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(status.map(|(s,)| s))
    }

    pub async fn set_total_rows(&self, id: i32, total: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE import_jobs SET total_rows = $1 WHERE id = $2")
            .bind(total)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Persist in-flight counters. Called at batch boundaries so a killed job
    /// reports recent, not stale, progress.
    pub async fn update_progress(
        &self,
        id: i32,
        processed: i64,
        successful: i64,
        failed: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE import_jobs
             SET processed_rows = $1, successful_rows = $2, failed_rows = $3
             WHERE id = $4",
        )
        .bind(processed)
        .bind(successful)
        .bind(failed)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record the terminal outcome of a processed job.
    pub async fn finish(
        &self,
        id: i32,
        status: JobStatus,
        total: i64,
        processed: i64,
        successful: i64,
        failed: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE import_jobs
             SET status = $1, total_rows = $2, processed_rows = $3,
                 successful_rows = $4, failed_rows = $5, completed_at = NOW()
             WHERE id = $6",
        )
        .bind(status)
        .bind(total)
        .bind(processed)
        .bind(successful)
        .bind(failed)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Abort a job to `failed` with the fatal cause recorded.
    pub async fn fail(&self, id: i32, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE import_jobs
             SET status = 'failed', error_message = $1, completed_at = NOW()
             WHERE id = $2",
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_determination_covers_all_outcomes() {
        assert_eq!(determine_status(10, 0, 10), JobStatus::Completed);
        assert_eq!(determine_status(7, 3, 10), JobStatus::Partial);
        assert_eq!(determine_status(0, 10, 10), JobStatus::Failed);
        // A zero-row clean run is a completion, not a failure.
        assert_eq!(determine_status(0, 0, 0), JobStatus::Completed);
        // Successes with a drifted total still complete.
        assert_eq!(determine_status(8, 0, 10), JobStatus::Completed);
    }

    #[test]
    fn terminal_states_are_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Partial.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn settings_default_to_plain_import() {
        let value = serde_json::json!({"is_grouped_import": true, "group_codes": ["100", "200"]});
        let settings: ImportSettings = serde_json::from_value(value).unwrap();
        assert!(settings.is_grouped_import);
        assert_eq!(settings.group_codes, ["100", "200"]);

        let empty: ImportSettings = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(!empty.is_grouped_import);
        assert!(empty.group_codes.is_empty());
    }
}
