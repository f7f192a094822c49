//! Report persistence for the parking gate worker.
//!
//! Every cycle ends with exactly one [`Report`](models::Report), written by
//! [`ReportWriter`] as its own JSON file. Reports are immutable once written;
//! the `release` command reads the newest one back with
//! [`ReportWriter::latest`].

pub mod error;
pub mod models;
pub mod writer;

pub use error::{StorageError, StorageResult};
pub use models::{ErrorDetail, Report, StageTiming};
pub use writer::ReportWriter;
