//! # fleet-migrate
//!
//! Moves the persisted state of the fleet gateway (namespaces, users,
//! devices, keys, sessions and session events) from a document store dump
//! into PostgreSQL.
//!
//! - **Stable identifiers**: legacy ids become deterministic UUIDv5 values
//! - **Dependency ordered**: tables load in phases so every foreign key
//!   target exists before its referrers
//! - **Resumable**: per-table state in `migration_state`; interrupted
//!   tables are truncated and reloaded, finished ones skipped
//! - **Bounded memory**: documents stream through fixed-size batches
//! - **Self-verifying**: row counts, relationship counts and spot checks
//!
//! ## Example
//!
//! ```rust,no_run
//! use fleet_migrate::{Config, Migrator};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> fleet_migrate::Result<()> {
//! let config = Config::load("config.yaml")?;
//! let migrator = Migrator::connect(&config).await?;
//! let result = migrator.run(CancellationToken::new()).await?;
//! println!("Migrated {} rows", result.rows_transferred);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod convert;
pub mod core;
pub mod error;
pub mod id;
pub mod orchestrator;
pub mod source;
pub mod state;
pub mod target;
pub mod transfer;
pub mod verify;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use core::{Row, SqlValue};
pub use error::{MigrateError, Result};
pub use orchestrator::{JobOutcome, MigrationResult, Migrator, TableOutcome};
pub use source::{DocumentSource, JsonlSource, MemorySource};
pub use state::{MemoryStateBackend, MigrationState, PgStateBackend, StateBackend, TaskStatus};
pub use target::{MemoryTarget, PgTarget, TargetStore};
pub use transfer::{LoadStats, ProgressUpdate};
pub use verify::ValidationReport;
