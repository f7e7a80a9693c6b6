//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MSSQL).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Reconciliation behavior configuration.
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Source database (MSSQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database type (always "mssql" for now).
    #[serde(default = "default_mssql")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Encrypt connection (default: "true").
    #[serde(default = "default_true_string")]
    pub encrypt: String,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

/// Target database (PostgreSQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type (always "postgres" for now).
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,
}

/// One source-schema/target-schema pair for name resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMapEntry {
    /// Schema name on the MSSQL side (e.g. "dbo").
    pub source_schema: String,

    /// Schema name on the PostgreSQL side (e.g. "public").
    pub target_schema: String,
}

/// Where mismatch details and summaries are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputMode {
    /// One CSV file per table under `output_path`.
    #[default]
    File,

    /// Summary/detail tables in the target database.
    Table,
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputMode::File => write!(f, "FILE"),
            OutputMode::Table => write!(f, "TABLE"),
        }
    }
}

/// Reconciliation behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Rows fetched per page from each side. Bounds peak memory use.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Report destination: FILE or TABLE.
    #[serde(default)]
    pub output_mode: OutputMode,

    /// Directory for CSV reports (FILE mode).
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Ordered schema pairs; lookup falls back to the first entry.
    #[serde(default)]
    pub schema_map: Vec<SchemaMapEntry>,

    /// Default table selection for the CLI. The engine itself always
    /// requires an explicit, non-empty list.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Connection pool size per database (default: 4).
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            output_mode: OutputMode::default(),
            output_path: default_output_path(),
            schema_map: Vec::new(),
            tables: Vec::new(),
            pool_size: default_pool_size(),
        }
    }
}

// Default value functions for serde

fn default_mssql() -> String {
    "mssql".to_string()
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_pg_port() -> u16 {
    5432
}

fn default_true_string() -> String {
    "true".to_string()
}

fn default_batch_size() -> usize {
    1000
}

fn default_output_path() -> PathBuf {
    PathBuf::from("./ValidationReports")
}

fn default_pool_size() -> usize {
    4
}
