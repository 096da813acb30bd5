//! Chunked, checkpointed block scanning.
//!
//! [`run_chunks`] walks an inclusive block range in fixed-size chunks and
//! hands each one to a [`ChunkProcessor`]. Progress is persisted as the last
//! fully processed block: every `checkpoint_interval` chunks, and always when
//! the run completes, fails or is cancelled. Rows are written by the
//! processor before the checkpoint that covers them, so an interrupted scan
//! may repeat at most one checkpoint interval and never skips a block.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{DeploymentSettings, ScannerSettings},
    db::store::CheckpointStore,
    error::ScanError,
    rpc::ChainSource,
    utils::{block_chunks, BlockRange},
};

/// Counts reported by a processor for one chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkStats {
    /// Matching logs returned by the node
    pub logs: usize,
    /// Rows newly written
    pub rows: u64,
}

#[async_trait]
pub trait ChunkProcessor: Send + Sync {
    /// Checkpoint key, also used as log prefix.
    fn name(&self) -> &'static str;

    /// Fetch, decode and store everything in `chunk`. Must either write all
    /// of the chunk's rows or fail.
    async fn process(&self, chunk: BlockRange) -> Result<ChunkStats, ScanError>;
}

/// Chunking and pacing of one scanner.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// First block when no checkpoint exists
    pub start_block: u64,
    pub chunk_size: u64,
    /// Flush the checkpoint every N chunks
    pub checkpoint_interval: usize,
    /// Pause between chunks
    pub chunk_delay: Duration,
    /// Blocks behind head left for the next run
    pub confirmations: u64,
}

impl ScanOptions {
    pub fn for_trades(settings: &ScannerSettings) -> Self {
        Self {
            start_block: settings.start_block,
            chunk_size: settings.chunk_size,
            checkpoint_interval: settings.checkpoint_interval_chunks,
            chunk_delay: Duration::from_millis(settings.chunk_delay_ms),
            confirmations: settings.confirmations,
        }
    }

    pub fn for_deployments(deployments: &DeploymentSettings, scanner: &ScannerSettings) -> Self {
        Self {
            start_block: deployments.start_block,
            chunk_size: deployments.chunk_size,
            checkpoint_interval: scanner.checkpoint_interval_chunks,
            chunk_delay: Duration::from_millis(scanner.chunk_delay_ms),
            confirmations: scanner.confirmations,
        }
    }
}

/// Outcome of one scan run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Range that was planned, `None` when already up to date
    pub range: Option<BlockRange>,
    pub chunks: usize,
    pub logs: usize,
    pub rows: u64,
    /// Last fully processed block
    pub last_block: Option<u64>,
    pub cancelled: bool,
}

impl ScanSummary {
    fn record(&mut self, chunk: BlockRange, stats: ChunkStats) {
        self.chunks += 1;
        self.logs += stats.logs;
        self.rows += stats.rows;
        self.last_block = Some(chunk.to);
    }

    /// Sum of several partial summaries (backfill workers).
    pub fn merge(&mut self, other: &ScanSummary) {
        self.chunks += other.chunks;
        self.logs += other.logs;
        self.rows += other.rows;
        self.cancelled |= other.cancelled;
        self.last_block = match (self.last_block, other.last_block) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.range = match (self.range, other.range) {
            (Some(a), Some(b)) => Some(BlockRange {
                from: a.from.min(b.from),
                to: a.to.max(b.to),
            }),
            (a, b) => a.or(b),
        };
    }
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.range {
            None => write!(f, "up to date"),
            Some(range) => write!(
                f,
                "{} chunks over {} ({} logs, {} new rows){}",
                self.chunks,
                range,
                self.logs,
                self.rows,
                if self.cancelled { ", cancelled" } else { "" }
            ),
        }
    }
}

/// Range an incremental scan should cover, or `None` when up to date.
pub fn plan_range(
    start_block: u64,
    checkpoint: Option<u64>,
    head: u64,
    confirmations: u64,
    limit: Option<u64>,
) -> Option<BlockRange> {
    let from = match checkpoint {
        Some(last) => last.checked_add(1)?,
        None => start_block,
    };

    let mut to = head.saturating_sub(confirmations);
    if let Some(limit) = limit {
        to = to.min(limit);
    }

    BlockRange::new(from, to)
}

/// Drive `processor` over `range`. Pass `None` as `store` to scan without
/// touching the checkpoint.
pub async fn run_chunks<P, C>(
    processor: &P,
    store: Option<&C>,
    range: BlockRange,
    options: &ScanOptions,
    cancel: &CancellationToken,
) -> Result<ScanSummary, ScanError>
where
    P: ChunkProcessor + ?Sized,
    C: CheckpointStore + ?Sized,
{
    let name = processor.name();
    let interval = options.checkpoint_interval.max(1);
    let total_chunks = range.len().div_ceil(options.chunk_size.max(1));

    let mut summary = ScanSummary {
        range: Some(range),
        ..Default::default()
    };
    let mut unflushed = 0usize;

    info!(
        "[{}] Scanning {} ({} blocks, {} chunks)",
        name,
        range,
        range.len(),
        total_chunks
    );

    for chunk in block_chunks(range, options.chunk_size) {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        match processor.process(chunk).await {
            Ok(stats) => {
                summary.record(chunk, stats);
                unflushed += 1;
                debug!(
                    "[{}] Chunk {} done: {} logs, {} new rows",
                    name, chunk, stats.logs, stats.rows
                );
            },
            Err(e) => {
                error!("[{}] Chunk {} failed: {}", name, chunk, e);
                if unflushed > 0 {
                    if let (Some(store), Some(last)) = (store, summary.last_block) {
                        if let Err(flush_err) = store.set_checkpoint(name, last).await {
                            error!(
                                "[{}] Failed to save checkpoint {} after chunk failure: {:#}",
                                name, last, flush_err
                            );
                        }
                    }
                }
                return Err(e);
            },
        }

        if unflushed >= interval {
            if let (Some(store), Some(last)) = (store, summary.last_block) {
                store.set_checkpoint(name, last).await?;
                info!(
                    "[{}] Checkpoint at block {} ({}/{} chunks, {} new rows)",
                    name, last, summary.chunks, total_chunks, summary.rows
                );
            }
            unflushed = 0;
        }

        if !options.chunk_delay.is_zero() && chunk.to < range.to {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(options.chunk_delay) => {}
            }
        }
    }

    if unflushed > 0 {
        if let (Some(store), Some(last)) = (store, summary.last_block) {
            store.set_checkpoint(name, last).await?;
        }
    }

    if summary.cancelled {
        warn!("[{}] Cancelled: {}", name, summary);
    } else {
        info!("[{}] Finished: {}", name, summary);
    }

    Ok(summary)
}

/// Resume `processor` from its checkpoint up to the current head (or
/// `limit`, whichever is lower).
pub async fn scan_incremental<P, C>(
    chain: &dyn ChainSource,
    store: &C,
    processor: &P,
    options: &ScanOptions,
    limit: Option<u64>,
    cancel: &CancellationToken,
) -> Result<ScanSummary, ScanError>
where
    P: ChunkProcessor + ?Sized,
    C: CheckpointStore + ?Sized,
{
    let name = processor.name();
    let checkpoint = store.get_checkpoint(name).await?;
    let head = chain.block_number().await?;

    let Some(range) = plan_range(
        options.start_block,
        checkpoint,
        head,
        options.confirmations,
        limit,
    ) else {
        info!(
            "[{}] Up to date (checkpoint: {:?}, head: {})",
            name, checkpoint, head
        );
        return Ok(ScanSummary::default());
    };

    match checkpoint {
        Some(last) => info!("[{}] Resuming after checkpoint {}", name, last),
        None => info!("[{}] No checkpoint, starting at block {}", name, range.from),
    }

    run_chunks(processor, Some(store), range, options, cancel).await
}
