//! PostgreSQL target database operations.

use crate::config::TargetConfig;
use crate::core::{Dialect, Row, RowPage, SchemaMapper, SqlValue, TableSpec};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use std::sync::Arc;
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, info};
use uuid::Uuid;

/// Trait for target database operations needed by the validation engine.
#[async_trait]
pub trait TargetPool: Send + Sync {
    /// List bare table names across the configured target schemas.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Row count for a table.
    async fn row_count(&self, spec: &TableSpec) -> Result<i64>;

    /// Fetch one deterministically ordered page of rows.
    async fn fetch_page(
        &self,
        spec: &TableSpec,
        key_columns: &[String],
        offset: i64,
        limit: i64,
    ) -> Result<RowPage>;
}

/// PostgreSQL target pool implementation.
pub struct PgPool {
    pool: Pool,
    mapper: SchemaMapper,
}

impl PgPool {
    /// Create a new PostgreSQL pool and verify connectivity.
    pub async fn new(config: &TargetConfig, mapper: SchemaMapper, max_conns: usize) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(max_conns)
            .build()
            .map_err(|e| ReconcileError::pool(e, "creating PostgreSQL pool"))?;

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| ReconcileError::pool(e, "testing PostgreSQL connection"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL: {}:{}/{} (pool_size={})",
            config.host, config.port, config.database, max_conns
        );

        Ok(Self { pool, mapper })
    }

    /// Shared access to the underlying deadpool pool (used by the table sink).
    pub fn inner(&self) -> Pool {
        self.pool.clone()
    }

    async fn get_client(&self) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| ReconcileError::pool(e, "getting PostgreSQL connection"))
    }

    fn order_clause(key_columns: &[String]) -> Option<String> {
        if key_columns.is_empty() {
            // No PK: PostgreSQL keeps OFFSET/LIMIT stable enough over an
            // unchanging heap; matches the source system's behavior.
            None
        } else {
            Some(
                key_columns
                    .iter()
                    .map(|c| c.to_lowercase())
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        }
    }
}

#[async_trait]
impl TargetPool for PgPool {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let client = self.get_client().await?;
        let mut schemas = self.mapper.target_schemas();
        if schemas.is_empty() {
            schemas.push("public".to_string());
        }
        let schemas: Vec<String> = schemas.iter().map(|s| s.to_lowercase()).collect();

        let rows = client
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_type = 'BASE TABLE' AND table_schema = ANY($1) \
                 ORDER BY table_name",
                &[&schemas],
            )
            .await?;

        let tables: Vec<String> = rows.iter().map(|r| r.get::<_, String>(0)).collect();
        info!("Target exposes {} tables", tables.len());
        Ok(tables)
    }

    async fn row_count(&self, spec: &TableSpec) -> Result<i64> {
        let physical = self.mapper.resolve(spec, Dialect::Postgres);
        let client = self.get_client().await?;

        let row = client
            .query_one(&format!("SELECT COUNT(*) FROM {}", physical), &[])
            .await?;
        Ok(row.get::<_, i64>(0))
    }

    async fn fetch_page(
        &self,
        spec: &TableSpec,
        key_columns: &[String],
        offset: i64,
        limit: i64,
    ) -> Result<RowPage> {
        let physical = self.mapper.resolve(spec, Dialect::Postgres);
        let client = self.get_client().await?;

        let sql = match Self::order_clause(key_columns) {
            Some(order) => format!(
                "SELECT * FROM {} ORDER BY {} OFFSET {} LIMIT {}",
                physical, order, offset, limit
            ),
            None => format!("SELECT * FROM {} OFFSET {} LIMIT {}", physical, offset, limit),
        };

        // Prepare first so column names are known even for an empty page.
        let stmt = client.prepare(&sql).await?;
        let names: Arc<Vec<String>> = Arc::new(
            stmt.columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        );

        let rows = client.query(&stmt, &[]).await?;
        let mut page_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(names.len());
            for idx in 0..names.len() {
                values.push(convert_row_value(row, idx));
            }
            page_rows.push(Row::new(names.clone(), values));
        }

        debug!(
            table = %physical,
            offset,
            rows = page_rows.len(),
            "Fetched target page"
        );

        Ok(RowPage {
            offset,
            limit,
            columns: names,
            rows: page_rows,
        })
    }
}

/// Decode one tokio-postgres cell into a `SqlValue` by its wire type name.
fn convert_row_value(row: &tokio_postgres::Row, idx: usize) -> SqlValue {
    fn cell<'a, T>(row: &'a tokio_postgres::Row, idx: usize) -> Option<T>
    where
        T: tokio_postgres::types::FromSql<'a>,
    {
        row.try_get::<_, Option<T>>(idx).ok().flatten()
    }

    let ty = row.columns()[idx].type_();
    match ty.name() {
        "bool" => cell::<bool>(row, idx)
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),
        "int2" => cell::<i16>(row, idx)
            .map(SqlValue::I16)
            .unwrap_or(SqlValue::Null),
        "int4" => cell::<i32>(row, idx)
            .map(SqlValue::I32)
            .unwrap_or(SqlValue::Null),
        "int8" => cell::<i64>(row, idx)
            .map(SqlValue::I64)
            .unwrap_or(SqlValue::Null),
        "float4" => cell::<f32>(row, idx)
            .map(SqlValue::F32)
            .unwrap_or(SqlValue::Null),
        "float8" => cell::<f64>(row, idx)
            .map(SqlValue::F64)
            .unwrap_or(SqlValue::Null),
        "numeric" => cell::<rust_decimal::Decimal>(row, idx)
            .map(SqlValue::Decimal)
            .unwrap_or(SqlValue::Null),
        "uuid" => cell::<Uuid>(row, idx)
            .map(SqlValue::Uuid)
            .unwrap_or(SqlValue::Null),
        "timestamp" => cell::<NaiveDateTime>(row, idx)
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null),
        "timestamptz" => cell::<DateTime<FixedOffset>>(row, idx)
            .map(SqlValue::DateTimeOffset)
            .unwrap_or(SqlValue::Null),
        "date" => cell::<NaiveDate>(row, idx)
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null),
        "time" => cell::<NaiveTime>(row, idx)
            .map(SqlValue::Time)
            .unwrap_or(SqlValue::Null),
        "bytea" => cell::<Vec<u8>>(row, idx)
            .map(SqlValue::Bytes)
            .unwrap_or(SqlValue::Null),
        _ => {
            // Default: treat as text (covers text, varchar, bpchar, name,
            // json rendered as text, etc.)
            cell::<String>(row, idx)
                .map(SqlValue::String)
                .unwrap_or(SqlValue::Null)
        }
    }
}
