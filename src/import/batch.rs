//! Batched destination writes with per-batch failure isolation.
//!
//! Mapped rows accumulate into a fixed-capacity buffer and are written with
//! one multi-row insert per batch. Each batch commits on its own: a failed
//! batch marks every row in it as failed and the import moves on to the next
//! batch. There is no enclosing whole-job transaction — partial application
//! is visible and expected, which is what keeps memory bounded by the batch
//! size instead of the file size.

use crate::import::destination::DestinationHandle;
use crate::import::mapper::MappedRow;

/// Default batch size for plain imports (throughput-oriented).
pub const PLAIN_BATCH_SIZE: usize = 1000;

/// Default batch size for grouped imports (finer failure isolation).
pub const GROUPED_BATCH_SIZE: usize = 100;

/// Accumulates mapped rows and writes them to one destination table.
pub struct BatchInserter<'a> {
    handle: &'a DestinationHandle,
    table: String,
    columns: Vec<String>,
    capacity: usize,
    buffer: Vec<MappedRow>,
    successful: u64,
    failed: u64,
}

impl<'a> BatchInserter<'a> {
    pub fn new(
        handle: &'a DestinationHandle,
        table: impl Into<String>,
        columns: Vec<String>,
        capacity: usize,
    ) -> Self {
        Self {
            handle,
            table: table.into(),
            columns,
            capacity: capacity.max(1),
            buffer: Vec::with_capacity(capacity.max(1)),
            successful: 0,
            failed: 0,
        }
    }

    /// Buffer one row, flushing when the batch is full. Returns true when a
    /// flush happened (the orchestrator persists progress at that boundary).
    pub async fn push(&mut self, row: MappedRow) -> bool {
        self.buffer.push(row);
        if self.buffer.len() >= self.capacity {
            self.flush().await;
            true
        } else {
            false
        }
    }

    /// Write the buffered rows. A failed insert counts the whole batch as
    /// failed and is recovered here; it never propagates.
    pub async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let batch_size = self.buffer.len() as u64;
        match self
            .handle
            .insert_rows(&self.table, &self.columns, &self.buffer)
            .await
        {
            Ok(inserted) => {
                log::trace!("inserted batch of {} rows into {}", inserted, self.table);
                self.successful += batch_size;
            }
            Err(e) => {
                log::error!(
                    "batch insert into {} failed ({} rows): {}",
                    self.table,
                    batch_size,
                    e
                );
                self.failed += batch_size;
            }
        }
        self.buffer.clear();
    }

    pub fn successful(&self) -> u64 {
        self.successful
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
