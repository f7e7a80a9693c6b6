//! Report sink contract and mismatch record types.
//!
//! The engine is agnostic to whether findings land in CSV files or in
//! database tables; it only talks to [`ReportSink`]. Sink schema objects are
//! prepared exclusively once at run start under the assumption of a single
//! concurrent run - concurrent runs against the same sink are the caller's
//! problem, not guarded here.

mod csv;
mod table;

pub use self::csv::CsvSink;
pub use table::TableSink;

use crate::core::RowKey;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of finding a detail record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MismatchKind {
    /// Row present in source, absent in target.
    Missing,
    /// Row present in target, absent in source.
    Extra,
    /// Row present on both sides with a differing column value.
    Mismatch,
}

impl std::fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MismatchKind::Missing => write!(f, "Missing"),
            MismatchKind::Extra => write!(f, "Extra"),
            MismatchKind::Mismatch => write!(f, "Mismatch"),
        }
    }
}

/// One finding, immutable once created.
#[derive(Debug, Clone)]
pub struct MismatchRecord {
    pub table: String,
    pub row_key: RowKey,
    /// Differing column for `Mismatch`; `None` for whole-row findings.
    pub column: Option<String>,
    pub source_value: String,
    pub target_value: String,
    pub kind: MismatchKind,
    pub timestamp: DateTime<Utc>,
}

impl MismatchRecord {
    pub fn new(
        table: &str,
        row_key: RowKey,
        column: Option<String>,
        source_value: String,
        target_value: String,
        kind: MismatchKind,
    ) -> Self {
        Self {
            table: table.to_string(),
            row_key,
            column,
            source_value,
            target_value,
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Per-table outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableStatus {
    Matched,
    Mismatched,
}

impl std::fmt::Display for TableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableStatus::Matched => write!(f, "Matched"),
            TableStatus::Mismatched => write!(f, "Mismatched"),
        }
    }
}

/// Aggregated result for one validated table. Counts grow batch by batch and
/// are finalized when the table's loop ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSummary {
    pub table: String,
    pub source_rows: i64,
    pub target_rows: i64,
    pub missing: i64,
    pub extra: i64,
    pub mismatched: i64,
    pub status: TableStatus,
    pub has_primary_key: bool,
}

impl TableSummary {
    pub fn new(table: &str, source_rows: i64, target_rows: i64, has_primary_key: bool) -> Self {
        Self {
            table: table.to_string(),
            source_rows,
            target_rows,
            missing: 0,
            extra: 0,
            mismatched: 0,
            status: TableStatus::Matched,
            has_primary_key,
        }
    }

    /// Recompute the status from the counts. `Matched` iff all three counts
    /// are zero.
    pub fn finalize(&mut self) {
        self.status = if self.missing == 0 && self.extra == 0 && self.mismatched == 0 {
            TableStatus::Matched
        } else {
            TableStatus::Mismatched
        };
    }
}

/// Opaque handle linking detail records to their summary row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SummaryId(pub i64);

/// Destination for structured mismatch findings.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Prepare sink schema objects: create-if-absent, then truncate.
    /// Called exactly once per run, before any table work.
    async fn ensure_schema(&self) -> Result<()>;

    /// Record that validation of a table has started; returns the handle
    /// detail records are attached to.
    async fn write_summary(&self, summary: &TableSummary) -> Result<SummaryId>;

    /// Write final counts for a completed table.
    async fn update_summary(&self, id: SummaryId, summary: &TableSummary) -> Result<()>;

    /// Persist one finding.
    async fn write_detail(&self, id: SummaryId, record: &MismatchRecord) -> Result<()>;
}
