//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source document dump configuration.
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source document store configuration.
///
/// The source is a frozen export: one `<collection>.jsonl` file per
/// collection inside `dump_dir`, one Extended JSON document per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory holding the collection dump files.
    pub dump_dir: PathBuf,
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
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
    #[serde(default)]
    pub password: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode: disable, require, verify-ca, verify-full (default: "disable").
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,

    /// Connection pool size (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Migration behavior configuration.
///
/// Unset values fall back to the defaults returned by the `get_*` accessors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per bulk insert for most tables (default: 1000).
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Rows per bulk insert for session events (default: 10000).
    #[serde(default)]
    pub session_events_batch_size: Option<usize>,

    /// Emit a progress update every N flushed rows (default: 10000).
    #[serde(default)]
    pub progress_interval: Option<u64>,

    /// Documents sampled per entity kind during spot checks (default: 10).
    #[serde(default)]
    pub sample_size: Option<usize>,

    /// Disable triggers on session_events while loading (default: true).
    #[serde(default)]
    pub disable_triggers: Option<bool>,
}

impl MigrationConfig {
    pub fn get_batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    pub fn get_session_events_batch_size(&self) -> usize {
        self.session_events_batch_size
            .unwrap_or(DEFAULT_SESSION_EVENTS_BATCH_SIZE)
    }

    pub fn get_progress_interval(&self) -> u64 {
        self.progress_interval.unwrap_or(DEFAULT_PROGRESS_INTERVAL)
    }

    pub fn get_sample_size(&self) -> usize {
        self.sample_size.unwrap_or(DEFAULT_SAMPLE_SIZE)
    }

    pub fn get_disable_triggers(&self) -> bool {
        self.disable_triggers.unwrap_or(true)
    }
}

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_SESSION_EVENTS_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 10_000;
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_max_connections() -> usize {
    4
}
