//! PostgreSQL-backed state storage.
//!
//! Lives in the `migration_state` table of the target schema, next to the
//! migrated data, so progress and data share one database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tracing::debug;

use super::backend::{str_to_task_status, task_status_to_str, StateBackend};
use super::{MigrationState, TaskStatus};
use crate::core::identifier::qualify_pg;
use crate::core::schema::MIGRATION_STATE_TABLE;
use crate::error::{MigrateError, Result};

const COLUMNS: &str = "table_name, status, source_count, target_count, started_at, completed_at";

/// Database state backend for migration runs.
pub struct PgStateBackend {
    pool: Pool,
    table: String,
}

impl PgStateBackend {
    /// Create a state backend writing to `schema.migration_state`.
    pub fn new(pool: Pool, schema: &str) -> Result<Self> {
        Ok(Self {
            pool,
            table: qualify_pg(schema, MIGRATION_STATE_TABLE)?,
        })
    }

    async fn client(&self, context: &str) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, context.to_string()))
    }

    async fn set_status(&self, table: &str, status: TaskStatus, sql: &str) -> Result<()> {
        let client = self.client("updating migration state").await?;
        client
            .execute(sql, &[&table, &task_status_to_str(status)])
            .await?;
        debug!("{}: state -> {}", table, status);
        Ok(())
    }
}

fn row_to_state(row: &tokio_postgres::Row) -> Result<MigrationState> {
    let status: String = row.try_get(1)?;
    Ok(MigrationState {
        table_name: row.try_get(0)?,
        status: str_to_task_status(&status)?,
        source_count: row.try_get(2)?,
        target_count: row.try_get(3)?,
        started_at: row.try_get::<_, Option<DateTime<Utc>>>(4)?,
        completed_at: row.try_get::<_, Option<DateTime<Utc>>>(5)?,
    })
}

#[async_trait]
impl StateBackend for PgStateBackend {
    async fn init_schema(&self) -> Result<()> {
        let client = self.client("initializing migration state").await?;
        client
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    table_name TEXT PRIMARY KEY,
                    status TEXT NOT NULL CHECK (status IN ('pending', 'in_progress', 'completed')),
                    source_count BIGINT,
                    target_count BIGINT,
                    started_at TIMESTAMPTZ,
                    completed_at TIMESTAMPTZ
                )",
                self.table
            ))
            .await?;
        Ok(())
    }

    async fn get(&self, table: &str) -> Result<Option<MigrationState>> {
        let client = self.client("reading migration state").await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM {} WHERE table_name = $1", COLUMNS, self.table),
                &[&table],
            )
            .await?;
        row.as_ref().map(row_to_state).transpose()
    }

    async fn mark_in_progress(&self, table: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (table_name, status, started_at, completed_at)
             VALUES ($1, $2, NOW(), NULL)
             ON CONFLICT (table_name) DO UPDATE SET
                status = EXCLUDED.status,
                started_at = EXCLUDED.started_at,
                completed_at = NULL",
            self.table
        );
        self.set_status(table, TaskStatus::InProgress, &sql).await
    }

    async fn mark_completed(&self, table: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (table_name, status, completed_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (table_name) DO UPDATE SET
                status = EXCLUDED.status,
                completed_at = EXCLUDED.completed_at",
            self.table
        );
        self.set_status(table, TaskStatus::Completed, &sql).await
    }

    async fn record_counts(
        &self,
        table: &str,
        source_count: i64,
        target_count: i64,
    ) -> Result<()> {
        let client = self.client("recording validation counts").await?;
        let updated = client
            .execute(
                &format!(
                    "UPDATE {} SET source_count = $2, target_count = $3 WHERE table_name = $1",
                    self.table
                ),
                &[&table, &source_count, &target_count],
            )
            .await?;
        if updated == 0 {
            return Err(MigrateError::State(format!(
                "no migration state row for {}",
                table
            )));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<MigrationState>> {
        let client = self.client("listing migration state").await?;
        let rows = client
            .query(
                &format!("SELECT {} FROM {} ORDER BY table_name", COLUMNS, self.table),
                &[],
            )
            .await?;
        rows.iter().map(row_to_state).collect()
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }
}
