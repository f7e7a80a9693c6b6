//! Error types for the reconciliation library.

use thiserror::Error;

/// Main error type for reconciliation operations.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] tiberius::error::Error),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A batch fetch failed for a specific table and offset
    #[error("Fetch failed for table {table} at offset {offset}: {message}")]
    Fetch {
        table: String,
        offset: i64,
        message: String,
    },

    /// Keyless comparison found no columns shared by both sides
    #[error("Table {0} has no columns in common between source and target")]
    NoCommonColumns(String),

    /// The caller passed an empty table selection
    #[error("No tables requested - pass an explicit, non-empty table list")]
    NoTablesRequested,

    /// None of the requested tables exist on both sides
    #[error("No valid tables found in both source and target")]
    NoValidTables,

    /// Report sink error (CSV file or summary/detail tables)
    #[error("Report sink error: {0}")]
    Sink(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReconcileError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        ReconcileError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Fetch error for a table and offset
    pub fn fetch(table: impl Into<String>, offset: i64, message: impl ToString) -> Self {
        ReconcileError::Fetch {
            table: table.into(),
            offset,
            message: message.to_string(),
        }
    }

    /// Process exit code for this error category, used by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            ReconcileError::Config(_) | ReconcileError::Yaml(_) => 2,
            ReconcileError::NoTablesRequested | ReconcileError::NoValidTables => 3,
            ReconcileError::Source(_) | ReconcileError::Pool { .. } => 4,
            ReconcileError::Target(_) => 5,
            ReconcileError::Sink(_) | ReconcileError::Io(_) | ReconcileError::Csv(_) => 6,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
