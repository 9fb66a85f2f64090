//! In-memory state storage.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::backend::StateBackend;
use super::{MigrationState, TaskStatus};
use crate::error::{MigrateError, Result};

/// State backend held in process memory. Survives across runs that share
/// the instance, which is enough to exercise resume.
#[derive(Default)]
pub struct MemoryStateBackend {
    rows: Mutex<BTreeMap<String, MigrationState>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryStateBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every state write for `table` fail until [`clear_faults`].
    ///
    /// [`clear_faults`]: MemoryStateBackend::clear_faults
    pub fn fail_writes_for(&self, table: &str) {
        self.lock_failing().insert(table.to_string());
    }

    pub fn clear_faults(&self) {
        self.lock_failing().clear();
    }

    fn lock_failing(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self, table: &str) -> Result<()> {
        if self.lock_failing().contains(table) {
            return Err(MigrateError::State(format!(
                "injected state write failure for {}",
                table
            )));
        }
        Ok(())
    }

    fn with_rows<T>(&self, f: impl FnOnce(&mut BTreeMap<String, MigrationState>) -> T) -> T {
        let mut rows = self
            .rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut rows)
    }
}

#[async_trait]
impl StateBackend for MemoryStateBackend {
    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, table: &str) -> Result<Option<MigrationState>> {
        Ok(self.with_rows(|rows| rows.get(table).cloned()))
    }

    async fn mark_in_progress(&self, table: &str) -> Result<()> {
        self.check_writable(table)?;
        self.with_rows(|rows| {
            let state = rows
                .entry(table.to_string())
                .or_insert_with(|| MigrationState::pending(table));
            state.status = TaskStatus::InProgress;
            state.started_at = Some(Utc::now());
            state.completed_at = None;
        });
        Ok(())
    }

    async fn mark_completed(&self, table: &str) -> Result<()> {
        self.check_writable(table)?;
        self.with_rows(|rows| {
            let state = rows
                .entry(table.to_string())
                .or_insert_with(|| MigrationState::pending(table));
            state.status = TaskStatus::Completed;
            state.completed_at = Some(Utc::now());
        });
        Ok(())
    }

    async fn record_counts(
        &self,
        table: &str,
        source_count: i64,
        target_count: i64,
    ) -> Result<()> {
        self.check_writable(table)?;
        self.with_rows(|rows| match rows.get_mut(table) {
            Some(state) => {
                state.source_count = Some(source_count);
                state.target_count = Some(target_count);
                Ok(())
            }
            None => Err(MigrateError::State(format!(
                "no migration state row for {}",
                table
            ))),
        })
    }

    async fn list(&self) -> Result<Vec<MigrationState>> {
        Ok(self.with_rows(|rows| rows.values().cloned().collect()))
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
