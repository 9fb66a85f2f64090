//! Migration orchestrator - main workflow coordinator.
//!
//! Drives the job registry through the per-table state machine:
//!
//! ```text
//! absent/pending --run--> in_progress --ok--> completed
//!                              |
//!                    crash/error: stays in_progress,
//!                    next run truncates and redoes
//! ```
//!
//! Jobs run one at a time in registry order; the first failure aborts the
//! run. Validation runs once every job has completed.

pub mod jobs;

pub use jobs::{registry, EntityJob, JobContext, SessionJob, TableJob};

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, MigrationConfig};
use crate::error::{MigrateError, Result};
use crate::source::{DocumentSource, JsonlSource};
use crate::state::{MigrationState, PgStateBackend, StateBackend, TaskStatus};
use crate::target::{PgTarget, TargetStore};
use crate::transfer::{ProgressUpdate, TransferContext};
use crate::verify::{ValidationReport, Validator};

/// What happened to one table during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Already completed by an earlier run.
    Skipped,
    /// Loaded from scratch.
    Migrated { rows: u64 },
    /// Left in progress by an earlier run; truncated and reloaded.
    Retried { rows: u64 },
}

impl JobOutcome {
    pub fn rows(&self) -> u64 {
        match self {
            JobOutcome::Skipped => 0,
            JobOutcome::Migrated { rows } | JobOutcome::Retried { rows } => *rows,
        }
    }
}

/// Per-table line of the run summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableOutcome {
    pub table: String,
    pub phase: u8,
    #[serde(flatten)]
    pub outcome: JobOutcome,
    pub duration_seconds: f64,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Per-table outcomes, in job order.
    pub tables: Vec<TableOutcome>,

    /// Tables loaded during this run.
    pub tables_migrated: usize,

    /// Tables skipped because an earlier run completed them.
    pub tables_skipped: usize,

    /// Total rows written during this run.
    pub rows_transferred: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: i64,

    /// What validation checked.
    pub validation: ValidationReport,
}

impl MigrationResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Migration orchestrator.
pub struct Migrator {
    config: MigrationConfig,
    source: Arc<dyn DocumentSource>,
    target: Arc<dyn TargetStore>,
    state: Arc<dyn StateBackend>,
    jobs: Vec<Box<dyn TableJob>>,
    progress_tx: Option<mpsc::Sender<ProgressUpdate>>,
}

impl Migrator {
    /// Create a migrator over explicit stores, with the standard job registry.
    pub fn new(
        config: MigrationConfig,
        source: Arc<dyn DocumentSource>,
        target: Arc<dyn TargetStore>,
        state: Arc<dyn StateBackend>,
    ) -> Self {
        Self {
            config,
            source,
            target,
            state,
            jobs: registry(),
            progress_tx: None,
        }
    }

    /// Open the dump directory and connect to PostgreSQL. State lives in the
    /// target schema and shares the target's connection pool.
    pub async fn connect(config: &Config) -> Result<Self> {
        let source = JsonlSource::new(config.source.dump_dir.clone())?;
        let target = PgTarget::connect(&config.target).await?;
        let state = PgStateBackend::new(target.pool(), target.schema())?;
        Ok(Self::new(
            config.migration.clone(),
            Arc::new(source),
            Arc::new(target),
            Arc::new(state),
        ))
    }

    /// Set progress channel for updates.
    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    fn transfer_context(&self, cancel: CancellationToken) -> TransferContext {
        let ctx = TransferContext::new(self.source.clone(), self.target.clone(), cancel);
        match &self.progress_tx {
            Some(tx) => ctx.with_progress(tx.clone()),
            None => ctx,
        }
    }

    /// Run the migration.
    pub async fn run(&self, cancel: CancellationToken) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Starting migration run: {} ({} -> {}, state: {})",
            run_id,
            self.source.source_type(),
            self.target.target_type(),
            self.state.backend_type()
        );
        self.state.init_schema().await?;

        let ctx = self.transfer_context(cancel.clone());
        let job_ctx = JobContext {
            transfer: &ctx,
            config: &self.config,
        };

        let mut tables = Vec::with_capacity(self.jobs.len());
        let mut current_phase = 0;
        for job in &self.jobs {
            if job.phase() != current_phase {
                current_phase = job.phase();
                info!("Phase {}: {}", current_phase, self.phase_tables(current_phase));
            }
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }
            let outcome = self
                .run_job(job.as_ref(), &job_ctx)
                .await
                .map_err(|e| MigrateError::job(job.name(), e))?;
            tables.push(outcome);
        }

        info!("Phase {}: validation", current_phase + 1);
        let validation = self.validator(cancel).validate().await?;

        let duration = start.elapsed().as_secs_f64();
        let rows_transferred: u64 = tables.iter().map(|t| t.outcome.rows()).sum();
        let tables_skipped = tables
            .iter()
            .filter(|t| t.outcome == JobOutcome::Skipped)
            .count();
        let result = MigrationResult {
            run_id,
            status: "completed".to_string(),
            duration_seconds: duration,
            started_at,
            completed_at: Utc::now(),
            tables_migrated: tables.len() - tables_skipped,
            tables_skipped,
            tables,
            rows_transferred,
            rows_per_second: if duration > 0.0 {
                (rows_transferred as f64 / duration) as i64
            } else {
                0
            },
            validation,
        };
        info!(
            "Migration completed: {} rows, {} tables migrated, {} skipped ({:.2}s)",
            result.rows_transferred, result.tables_migrated, result.tables_skipped, duration
        );
        Ok(result)
    }

    fn phase_tables(&self, phase: u8) -> String {
        self.jobs
            .iter()
            .filter(|j| j.phase() == phase)
            .map(|j| j.name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    async fn run_job(&self, job: &dyn TableJob, ctx: &JobContext<'_>) -> Result<TableOutcome> {
        let name = job.name();
        let start = Instant::now();

        let retried = match self.state.get(name).await?.map(|s| s.status) {
            Some(TaskStatus::Completed) => {
                info!("{}: already completed, skipping", name);
                return Ok(TableOutcome {
                    table: name.to_string(),
                    phase: job.phase(),
                    outcome: JobOutcome::Skipped,
                    duration_seconds: 0.0,
                });
            }
            Some(TaskStatus::InProgress) => {
                warn!("{}: interrupted by an earlier run, truncating and reloading", name);
                ctx.transfer
                    .cancellable(self.target.truncate(name, true))
                    .await?;
                true
            }
            Some(TaskStatus::Pending) | None => false,
        };

        self.state.mark_in_progress(name).await?;
        let stats = job.run(ctx).await?;
        self.state.mark_completed(name).await?;

        let outcome = if retried {
            JobOutcome::Retried { rows: stats.rows }
        } else {
            JobOutcome::Migrated { rows: stats.rows }
        };
        Ok(TableOutcome {
            table: name.to_string(),
            phase: job.phase(),
            outcome,
            duration_seconds: start.elapsed().as_secs_f64(),
        })
    }

    fn validator(&self, cancel: CancellationToken) -> Validator {
        Validator::new(
            self.transfer_context(cancel),
            self.state.clone(),
            self.config.get_sample_size(),
        )
    }

    /// Validate a finished migration without loading anything.
    ///
    /// Fails if any table has not completed.
    pub async fn validate(&self, cancel: CancellationToken) -> Result<ValidationReport> {
        self.state.init_schema().await?;
        let incomplete: Vec<_> = self
            .status()
            .await?
            .into_iter()
            .filter(|s| !s.is_completed())
            .map(|s| format!("{} ({})", s.table_name, s.status))
            .collect();
        if !incomplete.is_empty() {
            return Err(MigrateError::State(format!(
                "cannot validate before every table has completed: {}",
                incomplete.join(", ")
            )));
        }
        self.validator(cancel).validate().await
    }

    /// State of every job, in job order. Tables never started show as pending.
    pub async fn status(&self) -> Result<Vec<MigrationState>> {
        self.state.init_schema().await?;
        let mut out = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            let state = self
                .state
                .get(job.name())
                .await?
                .unwrap_or_else(|| MigrationState::pending(job.name()));
            out.push(state);
        }
        Ok(out)
    }
}
