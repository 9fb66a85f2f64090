//! Error types for the migration library.

use thiserror::Error;

/// A single field that differed between a source document and its migrated row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMismatch {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

impl std::fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (expected {:?}, got {:?})",
            self.field, self.expected, self.actual
        )
    }
}

fn format_mismatches(mismatches: &[FieldMismatch]) -> String {
    mismatches
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source document store could not be read
    #[error("Source error: {0}")]
    Source(String),

    /// A source document could not be decoded into its entity shape
    #[error("Failed to decode document from {collection}: {message}")]
    Decode { collection: String, message: String },

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Writing to a target table failed
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// The migration_state table could not be read or written
    #[error("State store error: {0}")]
    State(String),

    /// A table job failed; wraps the underlying cause
    #[error("Table job '{table}' failed: {source}")]
    Job {
        table: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// Row counts differ between a source collection and its target table
    #[error("Row count mismatch for {table}: source={source_count} target={target_count}")]
    CountMismatch {
        table: String,
        source_count: i64,
        target_count: i64,
    },

    /// Aggregate fan-out count differs from the join table row count
    #[error("Relationship count mismatch for {relation}: source={source_count} target={target_count}")]
    RelationshipMismatch {
        relation: String,
        source_count: i64,
        target_count: i64,
    },

    /// Sampled row does not match its source document
    #[error("Spot check failed for {table} row {id}: {}", format_mismatches(.mismatches))]
    SpotCheck {
        table: String,
        id: String,
        mismatches: Vec<FieldMismatch>,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(err: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: err.to_string(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Tag an error with the table job it came from.
    pub fn job(table: impl Into<String>, source: MigrateError) -> Self {
        MigrateError::Job {
            table: table.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error (or the error it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            MigrateError::Cancelled => true,
            MigrateError::Job { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Whether this error is a validation mismatch.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MigrateError::CountMismatch { .. }
                | MigrateError::RelationshipMismatch { .. }
                | MigrateError::SpotCheck { .. }
        )
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        if self.is_cancelled() {
            return 130;
        }
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            e if e.is_validation() => 3,
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

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
