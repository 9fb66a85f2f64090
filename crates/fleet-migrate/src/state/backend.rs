//! State backend trait for migration state storage.
//!
//! The orchestrator and validator work with `Arc<dyn StateBackend>`:
//!
//! - **PostgreSQL**: [`PgStateBackend`](super::PgStateBackend), the
//!   `migration_state` table in the target schema
//! - **Memory**: [`MemoryStateBackend`](super::MemoryStateBackend), for tests
//!   and dry runs

use async_trait::async_trait;

use super::{MigrationState, TaskStatus};
use crate::error::{MigrateError, Result};

/// Trait for migration state persistence backends.
///
/// Implementations must be `Send + Sync` to allow sharing across async tasks.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Create the state storage if it does not exist.
    ///
    /// This should be idempotent - safe to call multiple times.
    async fn init_schema(&self) -> Result<()>;

    /// Current state of `table`, or `None` if it has never been started.
    async fn get(&self, table: &str) -> Result<Option<MigrationState>>;

    /// Record that `table` is being loaded.
    ///
    /// Sets `started_at` to now and clears `completed_at`.
    async fn mark_in_progress(&self, table: &str) -> Result<()>;

    /// Record that `table` finished loading.
    async fn mark_completed(&self, table: &str) -> Result<()>;

    /// Store the validation counts for `table`.
    async fn record_counts(&self, table: &str, source_count: i64, target_count: i64)
        -> Result<()>;

    /// All rows, ordered by table name.
    async fn list(&self) -> Result<Vec<MigrationState>>;

    /// Get the backend type name for logging/debugging.
    fn backend_type(&self) -> &'static str;
}

/// Helper function to convert TaskStatus to string representation.
pub fn task_status_to_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Completed => "completed",
    }
}

/// Helper function to parse TaskStatus from string.
pub fn str_to_task_status(s: &str) -> Result<TaskStatus> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "in_progress" => Ok(TaskStatus::InProgress),
        "completed" => Ok(TaskStatus::Completed),
        _ => Err(MigrateError::State(format!("Invalid task status: {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_roundtrip() {
        let statuses = [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
        ];

        for status in statuses {
            let s = task_status_to_str(status);
            let parsed = str_to_task_status(s).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_invalid_task_status() {
        assert!(str_to_task_status("failed").is_err());
    }
}
