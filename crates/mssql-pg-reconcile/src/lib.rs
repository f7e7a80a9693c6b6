//! MSSQL to PostgreSQL data reconciliation library.
//!
//! Compares table contents between a SQL Server source and a PostgreSQL
//! target, batch by batch, and reports missing rows, extra rows, and
//! per-column value mismatches to CSV files or a PostgreSQL report table.
//!
//! The typical entry point is [`ValidationEngine::connect`] with a loaded
//! [`Config`], followed by [`ValidationEngine::run_all`] over the selected
//! tables. All comparison semantics live in [`core`]; the engine only
//! orchestrates fetching, matching, and report writing.

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod sink;
pub mod source;
pub mod target;

pub use config::{Config, OutputMode, SchemaMapEntry, ValidationConfig};
pub use core::{Dialect, Row, RowKey, RowPage, SchemaMapper, SqlValue, TableSpec};
pub use engine::{CancelFlag, ProgressUpdate, RunStatus, RunSummary, ValidationEngine};
pub use error::{ReconcileError, Result};
pub use sink::{
    CsvSink, MismatchKind, MismatchRecord, ReportSink, SummaryId, TableStatus, TableSummary,
};
pub use source::{MssqlPool, SourcePool};
pub use target::{PgPool, TargetPool};
