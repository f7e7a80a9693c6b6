//! Validation orchestrator - drives the per-table reconciliation loop.

mod cancel;
pub mod matcher;

pub use cancel::CancelFlag;

use crate::config::{Config, OutputMode};
use crate::core::{RowPage, SchemaMapper, TableSpec};
use crate::error::{ReconcileError, Result};
use crate::sink::{CsvSink, ReportSink, TableSink, TableSummary};
use crate::source::{MssqlPool, SourcePool};
use crate::target::{PgPool, TargetPool};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Progress snapshot handed to the caller after every processed page.
///
/// Callbacks run synchronously inside the engine loop; a slow callback
/// directly throttles throughput.
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate {
    pub tables_processed: usize,
    pub rows_processed: i64,
    pub total_estimated: i64,
}

/// Synchronous progress callback.
pub type ProgressFn<'a> = &'a (dyn Fn(ProgressUpdate) + Send + Sync);

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// Aggregate result of a full run. Returned even when the run was
/// cancelled part-way, carrying the partial per-table aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub tables_validated: usize,
    pub rows_processed: i64,
    pub total_rows_estimated: i64,
    pub mismatched_rows: i64,
    pub duration_seconds: f64,
    pub output_mode: String,
    pub tables: Vec<TableSummary>,
}

impl RunSummary {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Reconciliation engine: one run at a time, tables processed sequentially,
/// one page per side resident in memory.
pub struct ValidationEngine {
    source: Arc<dyn SourcePool>,
    target: Arc<dyn TargetPool>,
    sink: Arc<dyn ReportSink>,
    batch_size: usize,
    output_mode: OutputMode,
    cancel: CancelFlag,
}

impl ValidationEngine {
    /// Build an engine over already-constructed collaborators. Used directly
    /// by tests; production code goes through [`ValidationEngine::connect`].
    pub fn new(
        source: Arc<dyn SourcePool>,
        target: Arc<dyn TargetPool>,
        sink: Arc<dyn ReportSink>,
        batch_size: usize,
        output_mode: OutputMode,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(ReconcileError::Config(
                "batch_size must be at least 1".into(),
            ));
        }
        Ok(Self {
            source,
            target,
            sink,
            batch_size,
            output_mode,
            cancel: CancelFlag::new(),
        })
    }

    /// Connect both pools and wire the configured report sink.
    pub async fn connect(config: &Config) -> Result<Self> {
        config.validate()?;

        let mapper = SchemaMapper::new(config.validation.schema_map.clone());
        let pool_size = config.validation.pool_size;

        let source =
            MssqlPool::new(config.source.clone(), mapper.clone(), pool_size as u32).await?;
        let target = PgPool::new(&config.target, mapper, pool_size).await?;

        let sink: Arc<dyn ReportSink> = match config.validation.output_mode {
            OutputMode::File => Arc::new(CsvSink::new(&config.validation.output_path)),
            OutputMode::Table => Arc::new(TableSink::new(target.inner())),
        };

        Self::new(
            Arc::new(source),
            Arc::new(target),
            sink,
            config.validation.batch_size,
            config.validation.output_mode,
        )
    }

    /// The shared cancellation signal. The caller sets it to request a stop
    /// and clears it before starting a fresh run.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Validate all requested tables and return the aggregated summary.
    ///
    /// An empty `tables` list is rejected outright - the engine never
    /// defaults to "all tables".
    pub async fn run_all(
        &self,
        tables: &[String],
        progress: Option<ProgressFn<'_>>,
    ) -> Result<RunSummary> {
        if tables.is_empty() {
            return Err(ReconcileError::NoTablesRequested);
        }

        let started = Instant::now();
        let started_at = Utc::now();
        info!(requested = tables.len(), "Starting validation run");

        self.sink.ensure_schema().await?;

        let specs = self.valid_tables(tables).await?;
        let total_estimated = self.estimate_total_rows(&specs).await;

        let mut summary = RunSummary {
            status: RunStatus::Completed,
            tables_validated: 0,
            rows_processed: 0,
            total_rows_estimated: total_estimated,
            mismatched_rows: 0,
            duration_seconds: 0.0,
            output_mode: self.output_mode.to_string(),
            tables: Vec::new(),
        };

        for spec in &specs {
            if self.cancel.is_cancelled() {
                info!("Cancellation requested, stopping before table {}", spec);
                summary.status = RunStatus::Cancelled;
                break;
            }

            let (table_summary, rows_walked) = self
                .validate_table(spec, &summary, total_estimated, progress)
                .await?;

            summary.rows_processed += rows_walked;
            summary.tables_validated += 1;
            summary.mismatched_rows += table_summary.mismatched;
            info!(
                table = %table_summary.table,
                source_rows = table_summary.source_rows,
                target_rows = table_summary.target_rows,
                missing = table_summary.missing,
                extra = table_summary.extra,
                mismatched = table_summary.mismatched,
                status = %table_summary.status,
                "Table validated"
            );
            summary.tables.push(table_summary);
        }

        if self.cancel.is_cancelled() {
            summary.status = RunStatus::Cancelled;
        }
        summary.duration_seconds = started.elapsed().as_secs_f64();

        info!(
            status = ?summary.status,
            tables = summary.tables_validated,
            rows = summary.rows_processed,
            mismatched = summary.mismatched_rows,
            duration_s = format!("{:.1}", summary.duration_seconds),
            started_at = %started_at,
            "Validation run finished"
        );

        Ok(summary)
    }

    /// Intersect the requested list with tables existing on both sides,
    /// case-insensitively. Tables missing on either side are logged and
    /// excluded, not fatal.
    async fn valid_tables(&self, tables: &[String]) -> Result<Vec<TableSpec>> {
        let source_set: HashSet<String> = self
            .source
            .list_tables()
            .await?
            .into_iter()
            .map(|t| t.to_lowercase())
            .collect();
        let target_set: HashSet<String> = self
            .target
            .list_tables()
            .await?
            .into_iter()
            .map(|t| t.to_lowercase())
            .collect();

        let mut specs = Vec::new();
        for raw in tables {
            let spec = TableSpec::parse(raw);
            let name = spec.name_lower();
            if source_set.contains(&name) && target_set.contains(&name) {
                specs.push(spec);
            } else {
                warn!(table = %spec, "Table not found in both source and target, skipping");
            }
        }

        if specs.is_empty() {
            error!("No valid tables found in both source and target");
            return Err(ReconcileError::NoValidTables);
        }
        Ok(specs)
    }

    /// Sum source row counts to give the progress denominator before any
    /// comparison work starts. An estimate only, never re-verified mid-run.
    async fn estimate_total_rows(&self, specs: &[TableSpec]) -> i64 {
        let mut total = 0i64;
        for spec in specs {
            match self.source.row_count(spec).await {
                Ok(count) => {
                    debug!(table = %spec, rows = count, "Estimated rows");
                    total += count;
                }
                Err(e) => {
                    warn!(table = %spec, error = %e, "Failed to estimate row count");
                }
            }
        }
        total
    }

    /// Validate one table, batch by batch.
    ///
    /// Keyed mode pages while `offset < min(source_count, target_count)`;
    /// the count mismatch is logged separately and rows past the smaller
    /// count inside a fetched window still surface as Missing/Extra. Keyless
    /// mode pages to the larger count. Both bounds are accepted
    /// approximations when counts differ.
    async fn validate_table(
        &self,
        spec: &TableSpec,
        run: &RunSummary,
        total_estimated: i64,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<(TableSummary, i64)> {
        let table_name = spec.to_string();

        let key_columns = match self.source.primary_key(spec).await {
            Ok(pk) => pk,
            Err(e) => {
                warn!(table = %table_name, error = %e, "Failed to read primary key, using composite-key matching");
                Vec::new()
            }
        };
        let has_pk = !key_columns.is_empty();

        let source_count = self.counted(self.source.row_count(spec).await, spec, "source");
        let target_count = self.counted(self.target.row_count(spec).await, spec, "target");
        if source_count != target_count {
            warn!(
                table = %table_name,
                source = source_count,
                target = target_count,
                "Row count mismatch"
            );
        }

        let mut summary = TableSummary::new(&table_name, source_count, target_count, has_pk);
        let summary_id = self.sink.write_summary(&summary).await?;

        let bound = if has_pk {
            source_count.min(target_count)
        } else {
            source_count.max(target_count)
        };
        let batch = self.batch_size as i64;
        let mut offset = 0i64;
        let mut rows_walked = 0i64;

        'pages: while offset < bound {
            if self.cancel.is_cancelled() {
                info!(table = %table_name, offset, "Cancellation requested, leaving table loop");
                break;
            }

            let source_page = self.fetch_or_empty_source(spec, &key_columns, offset, batch).await;
            let target_page = self.fetch_or_empty_target(spec, &key_columns, offset, batch).await;

            if source_page.is_empty() && target_page.is_empty() {
                // True end-of-data and a transient double fetch failure look
                // identical here; the loop ends either way.
                warn!(table = %table_name, offset, "Both pages empty, ending table loop");
                break;
            }

            let outcome = if has_pk {
                matcher::match_keyed(&table_name, &key_columns, &source_page, &target_page, &self.cancel)
            } else {
                match matcher::match_keyless(&table_name, &source_page, &target_page, &self.cancel)
                {
                    Ok(outcome) => outcome,
                    Err(ReconcileError::NoCommonColumns(t)) => {
                        warn!(table = %t, offset, "No common columns, skipping table");
                        break 'pages;
                    }
                    Err(e) => return Err(e),
                }
            };

            summary.missing += outcome.missing;
            summary.extra += outcome.extra;
            summary.mismatched += outcome.mismatched_rows;
            for record in &outcome.records {
                self.sink.write_detail(summary_id, record).await?;
            }

            rows_walked += source_page.len() as i64;
            offset += batch;

            if let Some(cb) = progress {
                cb(ProgressUpdate {
                    tables_processed: run.tables_validated,
                    rows_processed: run.rows_processed + rows_walked,
                    total_estimated,
                });
            }

            if outcome.interrupted || self.cancel.is_cancelled() {
                info!(table = %table_name, offset, "Cancellation requested after batch");
                break;
            }
        }

        summary.finalize();
        self.sink.update_summary(summary_id, &summary).await?;
        Ok((summary, rows_walked))
    }

    fn counted(&self, result: Result<i64>, spec: &TableSpec, side: &str) -> i64 {
        match result {
            Ok(count) => count,
            Err(e) => {
                warn!(table = %spec, side, error = %e, "Failed to get row count, assuming 0");
                0
            }
        }
    }

    /// Fetch a source page, substituting an empty page on failure. The
    /// failure is logged with enough context to diagnose without re-running;
    /// the risk of false Missing/Extra findings from the empty substitute is
    /// a documented limitation.
    async fn fetch_or_empty_source(
        &self,
        spec: &TableSpec,
        key_columns: &[String],
        offset: i64,
        limit: i64,
    ) -> RowPage {
        match self.source.fetch_page(spec, key_columns, offset, limit).await {
            Ok(page) => page,
            Err(e) => {
                let err = ReconcileError::fetch(spec.to_string(), offset, e);
                warn!(error = %err, "Source batch fetch failed, substituting empty page");
                RowPage::empty(offset, limit)
            }
        }
    }

    async fn fetch_or_empty_target(
        &self,
        spec: &TableSpec,
        key_columns: &[String],
        offset: i64,
        limit: i64,
    ) -> RowPage {
        match self.target.fetch_page(spec, key_columns, offset, limit).await {
            Ok(page) => page,
            Err(e) => {
                let err = ReconcileError::fetch(spec.to_string(), offset, e);
                warn!(error = %err, "Target batch fetch failed, substituting empty page");
                RowPage::empty(offset, limit)
            }
        }
    }
}
