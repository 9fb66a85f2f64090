//! Scoped trigger suspension for bulk loads.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::Result;
use crate::target::TargetStore;

fn trigger_sql(qualified: &str, enable: bool) -> String {
    format!(
        "ALTER TABLE {} {} TRIGGER ALL",
        qualified,
        if enable { "ENABLE" } else { "DISABLE" }
    )
}

/// Keeps a table's triggers disabled until restored.
///
/// Call [`TriggerGuard::restore`] on every normal exit path. If the guard is
/// dropped while still armed (panic, or the owning future was dropped), the
/// re-enable statement is spawned onto the current runtime.
pub struct TriggerGuard {
    target: Arc<dyn TargetStore>,
    table: String,
    qualified: String,
    armed: bool,
}

impl TriggerGuard {
    /// Disable all triggers on `table`.
    ///
    /// The guard is armed before the statement is sent, so a failure or a
    /// dropped future still re-enables.
    pub async fn disable(target: Arc<dyn TargetStore>, table: &str) -> Result<Self> {
        let qualified = target.qualify(table)?;
        let guard = Self {
            target,
            table: table.to_string(),
            qualified,
            armed: true,
        };
        guard
            .target
            .exec_raw(&trigger_sql(&guard.qualified, false))
            .await?;
        info!("{}: triggers disabled for bulk load", table);
        Ok(guard)
    }

    /// Re-enable the triggers.
    pub async fn restore(mut self) -> Result<()> {
        self.armed = false;
        self.target
            .exec_raw(&trigger_sql(&self.qualified, true))
            .await?;
        info!("{}: triggers re-enabled", self.table);
        Ok(())
    }
}

impl Drop for TriggerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let sql = trigger_sql(&self.qualified, true);
        warn!("{}: load exited abnormally, re-enabling triggers", self.table);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let target = self.target.clone();
                let table = self.table.clone();
                handle.spawn(async move {
                    if let Err(e) = target.exec_raw(&sql).await {
                        error!("{}: failed to re-enable triggers: {}", table, e);
                    }
                });
            }
            Err(_) => error!(
                "{}: no runtime available to re-enable triggers; run manually: {}",
                self.table, sql
            ),
        }
    }
}
