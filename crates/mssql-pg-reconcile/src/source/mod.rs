//! MSSQL source database operations.

use crate::config::SourceConfig;
use crate::core::{Dialect, Row, RowPage, SchemaMapper, SqlValue, TableSpec};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::Arc;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};
use uuid::Uuid;

/// Trait for source database operations needed by the validation engine.
#[async_trait]
pub trait SourcePool: Send + Sync {
    /// List bare table names across the configured source schemas.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Ordered primary key column names, empty when the table has no key.
    async fn primary_key(&self, spec: &TableSpec) -> Result<Vec<String>>;

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

/// Column name and declared type, used to decode `SELECT *` result sets.
#[derive(Debug, Clone)]
struct ColumnMeta {
    name: String,
    data_type: String,
}

/// Connection manager for bb8 pool with tiberius.
#[derive(Clone)]
struct TiberiusConnectionManager {
    config: SourceConfig,
}

impl TiberiusConnectionManager {
    fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(&self.config.user, &self.config.password));

        match self.config.encrypt.to_lowercase().as_str() {
            "false" | "no" | "0" | "disable" => {
                config.encryption(EncryptionLevel::NotSupported);
            }
            _ => {
                if self.config.trust_server_cert {
                    config.trust_cert();
                }
                config.encryption(EncryptionLevel::Required);
            }
        }

        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;

        tcp.set_nodelay(true).ok();

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// MSSQL source pool implementation with connection pooling.
pub struct MssqlPool {
    pool: Pool<TiberiusConnectionManager>,
    mapper: SchemaMapper,
    // SELECT * decoding needs declared column types; cached per physical name.
    columns: Mutex<HashMap<String, Arc<Vec<ColumnMeta>>>>,
}

impl MssqlPool {
    /// Create a new MSSQL source pool and verify connectivity.
    pub async fn new(config: SourceConfig, mapper: SchemaMapper, max_size: u32) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(1))
            .build(manager)
            .await
            .map_err(|e| ReconcileError::pool(e, "creating MSSQL pool"))?;

        // Test connection
        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| ReconcileError::pool(e, "testing MSSQL connection"))?;

            conn.simple_query("SELECT 1")
                .await
                .map_err(ReconcileError::Source)?
                .into_row()
                .await
                .map_err(ReconcileError::Source)?;
        }

        info!(
            "Connected to MSSQL: {}:{}/{} (pool_size={})",
            config.host, config.port, config.database, max_size
        );

        Ok(Self {
            pool,
            mapper,
            columns: Mutex::new(HashMap::new()),
        })
    }

    async fn get_client(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| ReconcileError::pool(e, "getting MSSQL connection"))
    }

    /// Schema and table parts to bind for metadata queries.
    fn metadata_parts(&self, spec: &TableSpec) -> (String, String) {
        let physical = self.mapper.resolve(spec, Dialect::Mssql);
        let parsed = TableSpec::parse(&physical);
        (parsed.schema.unwrap_or_else(|| "dbo".into()), parsed.name)
    }

    /// Load declared column names and types, cached per table.
    async fn load_columns(&self, spec: &TableSpec) -> Result<Arc<Vec<ColumnMeta>>> {
        let physical = self.mapper.resolve(spec, Dialect::Mssql);
        {
            let cache = self.columns.lock().await;
            if let Some(cols) = cache.get(&physical) {
                return Ok(cols.clone());
            }
        }

        let (schema, table) = self.metadata_parts(spec);
        let mut client = self.get_client().await?;

        let query = r#"
            SELECT COLUMN_NAME, DATA_TYPE
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
            ORDER BY ORDINAL_POSITION
        "#;

        let mut query = Query::new(query);
        query.bind(schema);
        query.bind(table);

        let stream = query.query(&mut client).await.map_err(ReconcileError::Source)?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(ReconcileError::Source)?;

        let cols: Vec<ColumnMeta> = rows
            .iter()
            .map(|row| ColumnMeta {
                name: row.get::<&str, _>(0).unwrap_or_default().to_string(),
                data_type: row.get::<&str, _>(1).unwrap_or_default().to_string(),
            })
            .collect();

        debug!("Loaded {} columns for {}", cols.len(), physical);

        let cols = Arc::new(cols);
        self.columns
            .lock()
            .await
            .insert(physical, cols.clone());
        Ok(cols)
    }

    fn order_clause(key_columns: &[String]) -> String {
        if key_columns.is_empty() {
            // No PK: arbitrary-but-stable surrogate ordering so OFFSET/FETCH
            // windows neither skip nor duplicate rows between batches.
            "(SELECT NULL)".to_string()
        } else {
            key_columns
                .iter()
                .map(|c| format!("[{}]", c))
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

#[async_trait]
impl SourcePool for MssqlPool {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut client = self.get_client().await?;
        let mut schemas = self.mapper.source_schemas();
        if schemas.is_empty() {
            schemas.push("dbo".to_string());
        }

        let mut tables = Vec::new();
        for schema in schemas {
            let query = r#"
                SELECT TABLE_NAME
                FROM INFORMATION_SCHEMA.TABLES
                WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_SCHEMA = @P1
                ORDER BY TABLE_NAME
            "#;
            let mut q = Query::new(query);
            q.bind(schema.clone());

            let stream = q.query(&mut client).await.map_err(ReconcileError::Source)?;
            let rows = stream
                .into_first_result()
                .await
                .map_err(ReconcileError::Source)?;

            for row in rows {
                tables.push(row.get::<&str, _>(0).unwrap_or_default().to_string());
            }
        }

        info!("Source exposes {} tables", tables.len());
        Ok(tables)
    }

    async fn primary_key(&self, spec: &TableSpec) -> Result<Vec<String>> {
        let (schema, table) = self.metadata_parts(spec);
        let mut client = self.get_client().await?;

        let query = r#"
            SELECT c.COLUMN_NAME
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE c
                ON c.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
                AND c.TABLE_SCHEMA = tc.TABLE_SCHEMA
                AND c.TABLE_NAME = tc.TABLE_NAME
            WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
              AND tc.TABLE_SCHEMA = @P1
              AND tc.TABLE_NAME = @P2
            ORDER BY c.ORDINAL_POSITION
        "#;

        let mut query = Query::new(query);
        query.bind(schema);
        query.bind(table);

        let stream = query.query(&mut client).await.map_err(ReconcileError::Source)?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(ReconcileError::Source)?;

        let pk: Vec<String> = rows
            .iter()
            .map(|row| row.get::<&str, _>(0).unwrap_or_default().to_string())
            .collect();

        debug!("Primary key for {}: {:?}", spec, pk);
        Ok(pk)
    }

    async fn row_count(&self, spec: &TableSpec) -> Result<i64> {
        let physical = self.mapper.resolve(spec, Dialect::Mssql);
        let mut client = self.get_client().await?;

        let sql = format!("SELECT CAST(COUNT_BIG(*) AS BIGINT) FROM {}", physical);
        let stream = client
            .simple_query(&sql)
            .await
            .map_err(ReconcileError::Source)?;
        let row = stream.into_row().await.map_err(ReconcileError::Source)?;

        Ok(row.and_then(|r| r.get::<i64, _>(0)).unwrap_or(0))
    }

    async fn fetch_page(
        &self,
        spec: &TableSpec,
        key_columns: &[String],
        offset: i64,
        limit: i64,
    ) -> Result<RowPage> {
        let physical = self.mapper.resolve(spec, Dialect::Mssql);
        let columns = self.load_columns(spec).await?;

        let sql = format!(
            "SELECT * FROM {} ORDER BY {} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
            physical,
            Self::order_clause(key_columns),
            offset,
            limit
        );

        let mut client = self.get_client().await?;
        let stream = client
            .simple_query(&sql)
            .await
            .map_err(ReconcileError::Source)?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(ReconcileError::Source)?;

        let names: Arc<Vec<String>> = Arc::new(columns.iter().map(|c| c.name.clone()).collect());
        let mut page_rows = Vec::with_capacity(rows.len());

        for row in rows {
            let mut values = Vec::with_capacity(columns.len());
            for (idx, col) in columns.iter().enumerate() {
                values.push(convert_row_value(&row, idx, &col.data_type));
            }
            page_rows.push(Row::new(names.clone(), values));
        }

        debug!(
            table = %physical,
            offset,
            rows = page_rows.len(),
            "Fetched source page"
        );

        Ok(RowPage {
            offset,
            limit,
            columns: names,
            rows: page_rows,
        })
    }
}

/// Decode one tiberius cell into a `SqlValue` using the declared type.
fn convert_row_value(row: &tiberius::Row, idx: usize, data_type: &str) -> SqlValue {
    let dt = data_type.to_lowercase();

    match dt.as_str() {
        "bit" => row
            .get::<bool, _>(idx)
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),
        "tinyint" => row
            .get::<u8, _>(idx)
            .map(|v| SqlValue::I16(v as i16))
            .unwrap_or(SqlValue::Null),
        "smallint" => row
            .get::<i16, _>(idx)
            .map(SqlValue::I16)
            .unwrap_or(SqlValue::Null),
        "int" => row
            .get::<i32, _>(idx)
            .map(SqlValue::I32)
            .unwrap_or(SqlValue::Null),
        "bigint" => row
            .get::<i64, _>(idx)
            .map(SqlValue::I64)
            .unwrap_or(SqlValue::Null),
        "real" => row
            .get::<f32, _>(idx)
            .map(SqlValue::F32)
            .unwrap_or(SqlValue::Null),
        "float" => row
            .get::<f64, _>(idx)
            .map(SqlValue::F64)
            .unwrap_or(SqlValue::Null),
        "uniqueidentifier" => row
            .get::<Uuid, _>(idx)
            .map(SqlValue::Uuid)
            .unwrap_or(SqlValue::Null),
        "datetime" | "datetime2" | "smalldatetime" => row
            .get::<NaiveDateTime, _>(idx)
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null),
        "datetimeoffset" => row
            .get::<chrono::DateTime<chrono::Utc>, _>(idx)
            .map(|dt| SqlValue::DateTimeOffset(dt.into()))
            .unwrap_or(SqlValue::Null),
        "date" => {
            // Tiberius returns date as NaiveDateTime, extract just the date part
            row.get::<NaiveDateTime, _>(idx)
                .map(|dt| SqlValue::Date(dt.date()))
                .unwrap_or(SqlValue::Null)
        }
        "time" => {
            // Tiberius returns time as NaiveDateTime, extract just the time part
            row.get::<NaiveDateTime, _>(idx)
                .map(|dt| SqlValue::Time(dt.time()))
                .unwrap_or(SqlValue::Null)
        }
        "binary" | "varbinary" | "image" => row
            .get::<&[u8], _>(idx)
            .map(|v| SqlValue::Bytes(v.to_vec()))
            .unwrap_or(SqlValue::Null),
        "decimal" | "numeric" | "money" | "smallmoney" => {
            // Prefer string parse; tiberius numeric conversion is lossy.
            row.get::<&str, _>(idx)
                .and_then(|s| s.parse::<rust_decimal::Decimal>().ok())
                .map(SqlValue::Decimal)
                .or_else(|| {
                    row.get::<f64, _>(idx).map(|f| {
                        rust_decimal::Decimal::try_from(f)
                            .map(SqlValue::Decimal)
                            .unwrap_or(SqlValue::F64(f))
                    })
                })
                .unwrap_or(SqlValue::Null)
        }
        _ => {
            // Default: treat as string (covers varchar, nvarchar, char, nchar,
            // text, ntext, xml, etc.)
            row.get::<&str, _>(idx)
                .map(|s| SqlValue::String(s.to_string()))
                .unwrap_or(SqlValue::Null)
        }
    }
}
