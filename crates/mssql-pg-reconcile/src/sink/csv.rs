//! CSV file report sink: one detail file per table plus a run summary file.

use super::{MismatchRecord, ReportSink, SummaryId, TableSummary};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use tracing::info;

/// Writes findings as CSV files under the configured output directory.
///
/// Detail rows go to `<table>.csv` with a header written once per file;
/// final table summaries are appended to `summary.csv`.
pub struct CsvSink {
    dir: PathBuf,
    next_id: AtomicI64,
    writers: Mutex<HashMap<String, csv::Writer<File>>>,
}

const DETAIL_HEADER: [&str; 7] = [
    "TableName",
    "RowKey",
    "Column",
    "SourceValue",
    "TargetValue",
    "Timestamp",
    "Status",
];

const SUMMARY_HEADER: [&str; 8] = [
    "TableName",
    "SourceRows",
    "TargetRows",
    "Missing",
    "Extra",
    "Mismatched",
    "PrimaryKey",
    "Status",
];

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next_id: AtomicI64::new(1),
            writers: Mutex::new(HashMap::new()),
        }
    }

    /// Open a CSV file in append mode, writing `header` only when the file
    /// is new or empty.
    fn open_writer(path: &Path, header: &[&str]) -> Result<csv::Writer<File>> {
        let fresh = !path.exists() || path.metadata().map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::Writer::from_writer(file);
        if fresh {
            writer.write_record(header)?;
            writer.flush()?;
        }
        Ok(writer)
    }

    fn detail_path(&self, table: &str) -> PathBuf {
        // Table names can be schema-qualified; keep the file name flat.
        let stem = table.replace(['.', '[', ']', '"', '/', '\\'], "_");
        self.dir.join(format!("{}.csv", stem))
    }
}

#[async_trait]
impl ReportSink for CsvSink {
    async fn ensure_schema(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        info!(dir = %self.dir.display(), "CSV report directory ready");
        Ok(())
    }

    async fn write_summary(&self, _summary: &TableSummary) -> Result<SummaryId> {
        // Detail files carry the table name; the id only orders summary rows.
        Ok(SummaryId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn update_summary(&self, _id: SummaryId, summary: &TableSummary) -> Result<()> {
        let path = self.dir.join("summary.csv");
        let mut writer = Self::open_writer(&path, &SUMMARY_HEADER)?;
        writer.write_record([
            summary.table.as_str(),
            &summary.source_rows.to_string(),
            &summary.target_rows.to_string(),
            &summary.missing.to_string(),
            &summary.extra.to_string(),
            &summary.mismatched.to_string(),
            if summary.has_primary_key { "Exists" } else { "None" },
            &summary.status.to_string(),
        ])?;
        writer.flush()?;
        Ok(())
    }

    async fn write_detail(&self, _id: SummaryId, record: &MismatchRecord) -> Result<()> {
        let mut writers = self.writers.lock().expect("csv writer lock poisoned");
        if !writers.contains_key(&record.table) {
            let writer = Self::open_writer(&self.detail_path(&record.table), &DETAIL_HEADER)?;
            writers.insert(record.table.clone(), writer);
        }
        let writer = writers.get_mut(&record.table).expect("writer just inserted");

        writer.write_record([
            record.table.as_str(),
            &record.row_key.to_string(),
            record.column.as_deref().unwrap_or(""),
            &record.source_value,
            &record.target_value,
            &record.timestamp.to_rfc3339(),
            &record.kind.to_string(),
        ])?;
        writer.flush()?;
        Ok(())
    }
}
