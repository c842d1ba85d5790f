//! File-to-database import pipeline.
//!
//! Takes an uploaded tabular file (CSV or XLSX), a saved destination
//! connection, and a column mapping, and loads the file's rows into an
//! arbitrary table on that destination.
//!
//! # Architecture Overview
//!
//! - **`reader`**: Streams CSV and XLSX files as a uniform row iterator.
//!
//! - **`groups`**: Reconstructs named record groups from section-marked files
//!   (marker row, header row, data rows) for the grouped import mode.
//!
//! - **`mapper`**: Applies the job's source-to-destination column mapping,
//!   coercing dates and numbers by destination column name.
//!
//! - **`destination`**: Resolves catalog connections into ephemeral
//!   PostgreSQL or MySQL handles, with schema introspection and multi-row
//!   inserts.
//!
//! - **`batch`**: Buffers mapped rows into fixed-size batches; a failed batch
//!   is counted and skipped, never aborting the run.
//!
//! - **`jobs`**: Persistent job records with a `pending → processing →
//!   {completed | partial | failed}` lifecycle, claimed with
//!   `FOR UPDATE SKIP LOCKED`.
//!
//! - **`runner`**: Drives one claimed job end to end, checkpointing progress
//!   at batch boundaries.
//!
//! - **`worker`**: The background claim-and-process loop, spawned at server
//!   startup.
//!
//! # Data Flow
//!
//! 1. The HTTP layer stores a job row in `pending` with the file reference,
//!    destination, and mapping.
//! 2. The worker claims the oldest pending job and moves it to `processing`.
//! 3. The runner streams rows (plain) or extracted groups (grouped) through
//!    the mapping into batched inserts on the destination.
//! 4. Counters are persisted at each batch boundary; the terminal status is
//!    derived from the final successful/failed/total counts.

pub mod batch;
pub mod destination;
pub mod groups;
pub mod jobs;
pub mod mapper;
pub mod reader;
pub mod runner;
pub mod worker;

pub use groups::{Group, GroupExtractor, GroupSummary};
pub use jobs::{ImportJob, JobStatus, JobStore, NewImportJob};
pub use reader::FileFormat;
pub use worker::ImportWorker;
