//! Customer CSV ingest pipeline
//!
//! A resumable, crash-safe bulk import from a delimited text file into the
//! customer store:
//!
//! - [`reader`]: lazy, forward-only CSV record stream
//! - [`normalizer`]: raw record -> canonical customer row (or nothing)
//! - [`inserter`]: bounded batches with a duplicate-safe flush fallback
//! - [`runs`]: the persisted run state store (checkpoints, single-flight slot)
//! - [`orchestrator`]: admission, recovery, and the streaming loop
//!
//! Progress is checkpointed by input row index, so a later attempt resumes by
//! rescanning the source and discarding rows up to the checkpoint. Duplicate
//! writes across a resume are absorbed by the sink's unique email constraint
//! and the inserter's per-row fallback.

pub mod config;
pub mod inserter;
pub mod normalizer;
pub mod orchestrator;
pub mod reader;
pub mod runs;

pub use config::ImportConfig;
pub use inserter::BatchInserter;
pub use normalizer::{normalize, NewCustomer, RawCustomerRecord};
pub use orchestrator::{ImportOrchestrator, StartImportError};
pub use reader::{CsvSource, SourceError};
pub use runs::{ImportRun, ProgressSnapshot, RunStatus};
