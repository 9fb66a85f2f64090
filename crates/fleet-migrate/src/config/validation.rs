//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::error::{MigrateError, Result};

const SSL_MODES: &[&str] = &["disable", "require", "verify-ca", "verify-full"];

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.source.dump_dir.as_os_str().is_empty() {
        return Err(MigrateError::Config("source.dump_dir is required".into()));
    }

    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    validate_identifier(&config.target.schema)
        .map_err(|e| MigrateError::Config(format!("target.schema: {}", e)))?;
    if !SSL_MODES.contains(&config.target.ssl_mode.to_lowercase().as_str()) {
        return Err(MigrateError::Config(format!(
            "target.ssl_mode must be one of {}, got '{}'",
            SSL_MODES.join(", "),
            config.target.ssl_mode
        )));
    }
    if config.target.max_connections == 0 {
        return Err(MigrateError::Config(
            "target.max_connections must be at least 1".into(),
        ));
    }

    // Migration config validation - only check if explicitly set
    if let Some(0) = config.migration.batch_size {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if let Some(0) = config.migration.session_events_batch_size {
        return Err(MigrateError::Config(
            "migration.session_events_batch_size must be at least 1".into(),
        ));
    }
    if let Some(0) = config.migration.progress_interval {
        return Err(MigrateError::Config(
            "migration.progress_interval must be at least 1".into(),
        ));
    }

    Ok(())
}
