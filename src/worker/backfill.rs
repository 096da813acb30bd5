//! Partitioned historical trade scan.
//!
//! An explicit block range is split into contiguous parts, one per worker.
//! Workers run concurrently, each with its own RPC client, and never touch
//! the incremental checkpoint.

use std::sync::Arc;

use alloy::primitives::Address;
use futures::future::join_all;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use crate::{
    db::store::{CheckpointStore, TradeStore},
    error::{RpcError, ScanError},
    rpc::ChainSource,
    utils::{partition_range, BlockRange},
    worker::{
        scanner::{run_chunks, ScanOptions, ScanSummary},
        trades::{load_targets, TradeProcessor},
    },
};

/// Result of one backfill worker.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub worker: usize,
    pub range: BlockRange,
    pub result: Result<ScanSummary, ScanError>,
}

#[derive(Debug, Default)]
pub struct BackfillReport {
    /// Sum over successful workers
    pub total: ScanSummary,
    pub failed: Vec<WorkerOutcome>,
}

impl BackfillReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.total.cancelled
    }
}

/// Scan `[from, to]` for router trades with `workers` concurrent workers.
///
/// `connect(i)` builds the chain client of worker `i`. A failing worker is
/// reported without stopping the others.
pub async fn backfill_trades<F>(
    connect: F,
    store: Arc<dyn TradeStore>,
    routers: Vec<Address>,
    from: u64,
    to: u64,
    workers: usize,
    options: &ScanOptions,
    cancel: &CancellationToken,
) -> Result<BackfillReport, ScanError>
where
    F: Fn(usize) -> Result<Arc<dyn ChainSource>, RpcError>,
{
    let range = BlockRange::new(from, to).ok_or(ScanError::InvalidRange { from, to })?;

    let Some(targets) = load_targets(store.as_ref()).await? else {
        return Ok(BackfillReport::default());
    };

    let parts = partition_range(range, workers);
    info!(
        "Backfilling {} with {} workers ({} target tokens)",
        range,
        parts.len(),
        targets.len()
    );

    let mut tasks = Vec::with_capacity(parts.len());
    for (worker, part) in parts.into_iter().enumerate() {
        let chain = connect(worker)?;
        let processor = TradeProcessor::new(chain, store.clone(), targets.clone(), routers.clone());

        tasks.push(async move {
            info!("[backfill #{}] Scanning {}", worker, part);
            let result =
                run_chunks::<_, dyn CheckpointStore>(&processor, None, part, options, cancel).await;
            WorkerOutcome {
                worker,
                range: part,
                result,
            }
        });
    }

    let mut report = BackfillReport::default();
    for outcome in join_all(tasks).await {
        match &outcome.result {
            Ok(summary) => {
                info!("[backfill #{}] {}: {}", outcome.worker, outcome.range, summary);
                report.total.merge(summary);
            },
            Err(e) => {
                error!("[backfill #{}] {} failed: {}", outcome.worker, outcome.range, e);
                report.failed.push(outcome);
            },
        }
    }

    info!(
        "Backfill finished: {} ({} workers failed)",
        report.total,
        report.failed.len()
    );

    Ok(report)
}
