//! Streaming batch loader.
//!
//! Every table job runs the same loop: open a cursor over the source
//! collection, decode and convert one document at a time, buffer converted
//! rows, and bulk insert whenever the buffer reaches the batch size, plus a
//! final flush. Memory stays bounded by one batch regardless of collection
//! size. A decode or insert failure aborts the load; rows already flushed
//! stay in the target and are cleaned up by the next run's truncate.

mod triggers;

pub use triggers::TriggerGuard;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::convert::{decode, Converter, TargetRow};
use crate::core::Row;
use crate::error::{MigrateError, Result};
use crate::source::{DocumentSource, Filter, FindOptions};
use crate::target::TargetStore;

/// Progress signal emitted while a table loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub table: String,
    pub rows_loaded: u64,
}

/// Shared handles every load needs.
#[derive(Clone)]
pub struct TransferContext {
    pub source: Arc<dyn DocumentSource>,
    pub target: Arc<dyn TargetStore>,
    pub cancel: CancellationToken,
    pub progress_tx: Option<mpsc::Sender<ProgressUpdate>>,
}

impl TransferContext {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        target: Arc<dyn TargetStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            target,
            cancel,
            progress_tx: None,
        }
    }

    /// Set progress channel for updates.
    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Run `fut` unless the run is cancelled first.
    pub async fn cancellable<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(MigrateError::Cancelled),
            res = fut => res,
        }
    }

    async fn send_progress(&self, update: ProgressUpdate) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(update).await;
        }
    }
}

/// Per-load settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Rows per bulk insert.
    pub batch_size: usize,
    /// Emit progress every this many flushed rows.
    pub progress_interval: u64,
    /// Disable target triggers for the duration of the load.
    pub suspend_triggers: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: crate::config::DEFAULT_BATCH_SIZE,
            progress_interval: crate::config::DEFAULT_PROGRESS_INTERVAL,
            suspend_triggers: false,
        }
    }
}

/// Statistics from one table load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Source documents read.
    pub documents: u64,
    /// Target rows written.
    pub rows: u64,
    /// Bulk inserts issued.
    pub batches: u64,
    pub duration: Duration,
}

/// Stream `C::COLLECTION` through `converter` into its target table.
pub async fn load<C: Converter>(
    ctx: &TransferContext,
    converter: &C,
    options: LoadOptions,
) -> Result<LoadStats> {
    let table = <C::Row as TargetRow>::TABLE.name;
    let start = Instant::now();

    let mut stats = if options.suspend_triggers {
        // Not raced against cancellation: the statement may land on the
        // server after the client gives up on it.
        let guard = TriggerGuard::disable(ctx.target.clone(), table).await?;
        let result = stream_rows(ctx, converter, options).await;
        let restored = guard.restore().await;
        match (result, restored) {
            (Ok(stats), Ok(())) => stats,
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), restored) => {
                if let Err(restore_err) = restored {
                    warn!("{}: failed to re-enable triggers: {}", table, restore_err);
                }
                return Err(e);
            }
        }
    } else {
        stream_rows(ctx, converter, options).await?
    };

    stats.duration = start.elapsed();
    info!(
        "{}: loaded {} rows from {} documents in {} batches ({:.2}s)",
        table,
        stats.rows,
        stats.documents,
        stats.batches,
        stats.duration.as_secs_f64()
    );
    Ok(stats)
}

async fn stream_rows<C: Converter>(
    ctx: &TransferContext,
    converter: &C,
    options: LoadOptions,
) -> Result<LoadStats> {
    let batch_size = options.batch_size.max(1);
    let mut cursor = ctx
        .cancellable(ctx.source.find(
            C::COLLECTION,
            &Filter::all(),
            FindOptions::default(),
        ))
        .await?;

    let mut stats = LoadStats::default();
    let mut batch: Vec<C::Row> = Vec::with_capacity(batch_size);

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(MigrateError::Cancelled),
            item = cursor.next() => item,
        };
        let Some(item) = next else {
            break;
        };
        let doc: C::Document = decode(C::COLLECTION, item?)?;
        stats.documents += 1;
        converter.convert(doc, &mut batch);

        if batch.len() >= batch_size {
            flush(ctx, &mut batch, &mut stats, options).await?;
        }
    }

    if !batch.is_empty() {
        flush(ctx, &mut batch, &mut stats, options).await?;
    }
    Ok(stats)
}

async fn flush<R: TargetRow>(
    ctx: &TransferContext,
    batch: &mut Vec<R>,
    stats: &mut LoadStats,
    options: LoadOptions,
) -> Result<()> {
    let table = R::TABLE.name;
    let rows: Vec<Row> = batch.drain(..).map(TargetRow::into_values).collect();
    let written = ctx
        .cancellable(ctx.target.bulk_insert(table, R::TABLE.columns, rows))
        .await?;

    let before = stats.rows;
    stats.rows += written;
    stats.batches += 1;
    debug!("{}: flushed batch of {} rows", table, written);

    let interval = options.progress_interval.max(1);
    if before / interval != stats.rows / interval {
        info!("{}: {} rows loaded", table, stats.rows);
        ctx.send_progress(ProgressUpdate {
            table: table.to_string(),
            rows_loaded: stats.rows,
        })
        .await;
    }
    Ok(())
}
