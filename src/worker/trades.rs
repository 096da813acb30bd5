//! Router trade scanner.
//!
//! Records every transfer of a deployed Arena token that passes through a
//! router contract, attributed to the sender of the enclosing transaction.

use std::sync::Arc;

use alloy::{
    primitives::{Address, B256},
    sol_types::SolEvent,
};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use log::{debug, warn};
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;

use crate::{
    abis::Transfer,
    config::ScannerSettings,
    db::{models::RouterTrade, store::TradeStore},
    error::ScanError,
    rpc::{ChainSource, LogQuery},
    utils::{address_to_db, hex_encode, u256_to_f64, BlockRange},
    worker::{
        parser::{parse_router_legs, RouterLeg},
        scanner::{scan_incremental, ChunkProcessor, ChunkStats, ScanOptions, ScanSummary},
        deployments::DEPLOYMENTS_SCANNER,
        targets::TargetTokens,
    },
};

/// Checkpoint key of the incremental trade scan.
pub const TRADES_SCANNER: &str = "router_trades";

/// Parallel `eth_getTransactionByHash` requests per chunk
const TX_FETCH_CONCURRENCY: usize = 8;

pub struct TradeProcessor {
    chain: Arc<dyn ChainSource>,
    store: Arc<dyn TradeStore>,
    targets: TargetTokens,
    routers: Vec<Address>,
}

impl TradeProcessor {
    pub fn new(
        chain: Arc<dyn ChainSource>,
        store: Arc<dyn TradeStore>,
        targets: TargetTokens,
        routers: Vec<Address>,
    ) -> Self {
        Self {
            chain,
            store,
            targets,
            routers,
        }
    }

    /// Transaction senders for every hash, fetched once each.
    async fn senders(&self, legs: &[RouterLeg]) -> Result<FxHashMap<B256, Address>, ScanError> {
        let mut hashes: Vec<B256> = legs.iter().map(|l| l.tx_hash).collect();
        hashes.sort_unstable();
        hashes.dedup();

        let chain = &self.chain;
        stream::iter(hashes)
            .map(|hash| async move {
                let tx = chain.transaction(hash).await.map_err(ScanError::from)?;
                tx.map(|tx| (hash, tx.from))
                    .ok_or(ScanError::MissingTransaction(hash))
            })
            .buffer_unordered(TX_FETCH_CONCURRENCY)
            .try_collect()
            .await
    }

    fn to_trade(&self, leg: &RouterLeg, real_user: Address) -> RouterTrade {
        let decimals = self.targets.decimals(&leg.token).unwrap_or(18);

        RouterTrade {
            tx_hash: hex_encode(leg.tx_hash.as_slice()),
            log_index: leg.log_index,
            block_number: leg.block_number,
            token_address: address_to_db(&leg.token),
            real_user: address_to_db(&real_user),
            counterparty: address_to_db(&leg.counterparty),
            from_address: address_to_db(&leg.from),
            to_address: address_to_db(&leg.to),
            router_address: address_to_db(&leg.router),
            amount: leg.amount,
            amount_adjusted: u256_to_f64(leg.amount, decimals),
            side: leg.side,
        }
    }
}

#[async_trait]
impl ChunkProcessor for TradeProcessor {
    fn name(&self) -> &'static str {
        TRADES_SCANNER
    }

    async fn process(&self, chunk: BlockRange) -> Result<ChunkStats, ScanError> {
        let logs = self
            .chain
            .get_logs(&LogQuery {
                from_block: chunk.from,
                to_block: chunk.to,
                addresses: Vec::new(),
                topic0: Transfer::SIGNATURE_HASH,
            })
            .await?;

        let legs = parse_router_legs(&logs, &self.targets, &self.routers);
        if legs.is_empty() {
            return Ok(ChunkStats::default());
        }

        debug!(
            "[{}] {} router transfers out of {} Transfer logs in {}",
            TRADES_SCANNER,
            legs.len(),
            logs.len(),
            chunk
        );

        let senders = self.senders(&legs).await?;
        let trades: Vec<RouterTrade> = legs
            .iter()
            .filter_map(|leg| senders.get(&leg.tx_hash).map(|from| self.to_trade(leg, *from)))
            .collect();

        let rows = self.store.insert_trades(&trades).await?;

        Ok(ChunkStats {
            logs: legs.len(),
            rows,
        })
    }
}

/// Load the target set from the store. Returns `None` (with a warning) when
/// no deployment is known yet.
pub async fn load_targets(store: &dyn TradeStore) -> Result<Option<TargetTokens>, ScanError> {
    let targets = TargetTokens::from_rows(store.load_target_tokens().await?);
    if targets.is_empty() {
        warn!(
            "[{}] No target tokens loaded, run the deployment scanner first",
            TRADES_SCANNER
        );
        return Ok(None);
    }
    Ok(Some(targets))
}

/// Highest block the trade scan may reach. The target set is only complete
/// up to the deployment checkpoint, so the trade checkpoint must never pass
/// it. Returns `None` (with a warning) when deployments were never scanned.
async fn trade_scan_limit(
    store: &dyn TradeStore,
    limit: Option<u64>,
) -> Result<Option<u64>, ScanError> {
    let Some(deployed_to) = store.get_checkpoint(DEPLOYMENTS_SCANNER).await? else {
        warn!(
            "[{}] No {} checkpoint yet, run the deployment scanner first",
            TRADES_SCANNER, DEPLOYMENTS_SCANNER
        );
        return Ok(None);
    };

    Ok(Some(limit.map_or(deployed_to, |l| l.min(deployed_to))))
}

/// One incremental trade scan from the checkpoint to head, `limit` or the
/// deployment checkpoint, whichever is lowest.
pub async fn scan_trades(
    chain: Arc<dyn ChainSource>,
    store: Arc<dyn TradeStore>,
    settings: &ScannerSettings,
    limit: Option<u64>,
    cancel: &CancellationToken,
) -> Result<ScanSummary, ScanError> {
    let Some(limit) = trade_scan_limit(store.as_ref(), limit).await? else {
        return Ok(ScanSummary::default());
    };

    // Loaded after the limit so every target deployed up to it is included
    let Some(targets) = load_targets(store.as_ref()).await? else {
        return Ok(ScanSummary::default());
    };

    debug!("[{}] {} target tokens", TRADES_SCANNER, targets.len());

    let processor = TradeProcessor::new(
        chain.clone(),
        store.clone(),
        targets,
        settings.routers.clone(),
    );

    scan_incremental(
        chain.as_ref(),
        store.as_ref(),
        &processor,
        &ScanOptions::for_trades(settings),
        Some(limit),
        cancel,
    )
    .await
}
