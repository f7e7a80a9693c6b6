//! Configuration validation.
//!
//! Fails fast at construction time, before any database I/O.

use super::{Config, OutputMode};
use crate::error::{ReconcileError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(ReconcileError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(ReconcileError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(ReconcileError::Config("source.user is required".into()));
    }
    if config.source.r#type != "mssql" {
        return Err(ReconcileError::Config(format!(
            "source.type must be 'mssql', got '{}'",
            config.source.r#type
        )));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(ReconcileError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(ReconcileError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(ReconcileError::Config("target.user is required".into()));
    }
    if config.target.r#type != "postgres" {
        return Err(ReconcileError::Config(format!(
            "target.type must be 'postgres', got '{}'",
            config.target.r#type
        )));
    }

    // Validation config
    if config.validation.batch_size == 0 {
        return Err(ReconcileError::Config(
            "validation.batch_size must be at least 1".into(),
        ));
    }
    if config.validation.pool_size == 0 {
        return Err(ReconcileError::Config(
            "validation.pool_size must be at least 1".into(),
        ));
    }
    if config.validation.output_mode == OutputMode::File
        && config.validation.output_path.as_os_str().is_empty()
    {
        return Err(ReconcileError::Config(
            "validation.output_path is required in FILE mode".into(),
        ));
    }

    for (i, entry) in config.validation.schema_map.iter().enumerate() {
        if entry.source_schema.is_empty() || entry.target_schema.is_empty() {
            return Err(ReconcileError::Config(format!(
                "validation.schema_map[{}] must name both schemas",
                i
            )));
        }
    }

    Ok(())
}
