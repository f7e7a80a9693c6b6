//! Database report sink: summary/detail tables in the target PostgreSQL.

use super::{MismatchRecord, ReportSink, SummaryId, TableSummary};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use tracing::info;

const CREATE_SUMMARY: &str = r#"
CREATE TABLE IF NOT EXISTS datareconciler_summary (
    pk_summary_id BIGSERIAL PRIMARY KEY,
    table_name TEXT NOT NULL,
    source_rows BIGINT NOT NULL,
    target_rows BIGINT NOT NULL,
    missing BIGINT NOT NULL,
    extra BIGINT NOT NULL,
    mismatched BIGINT NOT NULL,
    has_primary_key BOOLEAN NOT NULL,
    status TEXT NOT NULL,
    validation_timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_DETAILS: &str = r#"
CREATE TABLE IF NOT EXISTS datareconciler_details (
    pk_detail_id BIGSERIAL PRIMARY KEY,
    fk_summary_id BIGINT NOT NULL,
    table_name TEXT NOT NULL,
    row_key TEXT NOT NULL,
    column_name TEXT,
    source_value TEXT NOT NULL,
    target_value TEXT NOT NULL,
    status TEXT NOT NULL,
    validation_timestamp TIMESTAMPTZ NOT NULL
)
"#;

/// Writes findings into `datareconciler_summary` / `datareconciler_details`
/// in the target database. Both tables are created if absent and truncated
/// at `ensure_schema`, so each run starts from a clean report.
pub struct TableSink {
    pool: Pool,
}

impl TableSink {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| ReconcileError::Sink(format!("getting sink connection: {}", e)))
    }
}

#[async_trait]
impl ReportSink for TableSink {
    async fn ensure_schema(&self) -> Result<()> {
        let client = self.client().await?;
        client.execute(CREATE_SUMMARY, &[]).await?;
        client.execute(CREATE_DETAILS, &[]).await?;
        client
            .execute("TRUNCATE TABLE datareconciler_summary", &[])
            .await?;
        client
            .execute("TRUNCATE TABLE datareconciler_details", &[])
            .await?;
        info!("Report tables ensured and truncated");
        Ok(())
    }

    async fn write_summary(&self, summary: &TableSummary) -> Result<SummaryId> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "INSERT INTO datareconciler_summary \
                 (table_name, source_rows, target_rows, missing, extra, mismatched, has_primary_key, status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 RETURNING pk_summary_id",
                &[
                    &summary.table,
                    &summary.source_rows,
                    &summary.target_rows,
                    &summary.missing,
                    &summary.extra,
                    &summary.mismatched,
                    &summary.has_primary_key,
                    &"Started",
                ],
            )
            .await?;
        Ok(SummaryId(row.get::<_, i64>(0)))
    }

    async fn update_summary(&self, id: SummaryId, summary: &TableSummary) -> Result<()> {
        let client = self.client().await?;
        client
            .execute(
                "UPDATE datareconciler_summary \
                 SET source_rows = $1, target_rows = $2, missing = $3, extra = $4, \
                     mismatched = $5, status = $6, validation_timestamp = now() \
                 WHERE pk_summary_id = $7",
                &[
                    &summary.source_rows,
                    &summary.target_rows,
                    &summary.missing,
                    &summary.extra,
                    &summary.mismatched,
                    &summary.status.to_string(),
                    &id.0,
                ],
            )
            .await?;
        Ok(())
    }

    async fn write_detail(&self, id: SummaryId, record: &MismatchRecord) -> Result<()> {
        let client = self.client().await?;
        client
            .execute(
                "INSERT INTO datareconciler_details \
                 (fk_summary_id, table_name, row_key, column_name, source_value, target_value, status, validation_timestamp) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                &[
                    &id.0,
                    &record.table,
                    &record.row_key.to_string(),
                    &record.column,
                    &record.source_value,
                    &record.target_value,
                    &record.kind.to_string(),
                    &record.timestamp,
                ],
            )
            .await?;
        Ok(())
    }
}
