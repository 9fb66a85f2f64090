//! Per-table migration progress.
//!
//! One row per table job in `migration_state`. The row is written before a
//! job starts and after it finishes, which is what makes a run resumable:
//! `completed` tables are skipped, `in_progress` tables are truncated and
//! redone.

mod backend;
mod db;
mod memory;

pub use backend::{str_to_task_status, task_status_to_str, StateBackend};
pub use db::PgStateBackend;
pub use memory::MemoryStateBackend;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(task_status_to_str(*self))
    }
}

/// One row of `migration_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationState {
    pub table_name: String,
    pub status: TaskStatus,
    /// Source-side count, written by validation.
    pub source_count: Option<i64>,
    /// Target-side count, written by validation.
    pub target_count: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl MigrationState {
    pub fn pending(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            status: TaskStatus::Pending,
            source_count: None,
            target_count: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}
