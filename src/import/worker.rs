//! Background worker that drains the import job queue.

use sqlx::PgPool;
use std::time::Duration;

use crate::import::jobs::JobStore;
use crate::import::runner::ImportRunner;
use crate::storage::FileStorage;

const IDLE_SLEEP: Duration = Duration::from_secs(5);
const ERROR_SLEEP: Duration = Duration::from_secs(10);

pub struct ImportWorker {
    store: JobStore,
    runner: ImportRunner,
}

impl ImportWorker {
    pub fn new(pool: PgPool, storage: FileStorage) -> Self {
        let store = JobStore::new(pool.clone());
        let runner = ImportRunner::new(pool, storage);
        Self { store, runner }
    }

    /// Run the claim-and-process loop forever.
    pub async fn run(self) -> ! {
        log::info!("import worker started");

        loop {
            let job = match self.store.claim_next().await {
                Ok(Some(job)) => {
                    log::info!(
                        "worker: claimed job {} ({} -> {}.{})",
                        job.id,
                        job.file_name,
                        job.database_name,
                        job.table_name
                    );
                    job
                }
                Ok(None) => {
                    tokio::time::sleep(IDLE_SLEEP).await;
                    continue;
                }
                Err(e) => {
                    log::error!("worker: failed to claim job: {}", e);
                    tokio::time::sleep(ERROR_SLEEP).await;
                    continue;
                }
            };

            match self.runner.run(&job).await {
                Ok(Some(outcome)) => {
                    log::info!(
                        "job {}: {:?} - {}/{} rows imported, {} failed",
                        job.id,
                        outcome.status,
                        outcome.successful,
                        outcome.total,
                        outcome.failed
                    );
                }
                Ok(None) => {
                    log::info!("job {}: stopped, no longer processing", job.id);
                }
                Err(e) => {
                    log::error!("job {}: fatal - {}", job.id, e);
                    if let Err(err) = self.store.fail(job.id, &e.to_string()).await {
                        log::error!("failed to mark job {} as failed: {}", job.id, err);
                    }
                }
            }
        }
    }
}
