//! Bonding (DEX migration) detection.
//!
//! A token has bonded once the Arena factory holds a pair of it against the
//! wrapped native token. Two passes find them:
//! - the event pass reads recent `PairCreated` logs and marks matching
//!   deployments;
//! - the lookup pass asks `getPair` for every recent unbonded deployment and
//!   locates the pair's creation block for the ones that have a pair.

use std::sync::Arc;

use alloy::{primitives::Address, sol_types::SolEvent};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    abis::PairCreated,
    config::BondingSettings,
    db::{
        models::{BondingCandidate, BondingUpdate},
        store::BondingStore,
    },
    error::ScanError,
    rpc::{ChainSource, LogQuery},
    utils::{address_to_db, block_chunks, normalize_address, BlockRange},
    worker::parser::decode_pair_created,
};

/// Blocks per `eth_getLogs` when searching for a pair's creation
const PAIR_SEARCH_CHUNK: u64 = 2_000;

pub const UNKNOWN_BONDING_TIME: &str = "could not determine bonding time";

/// Counts of one bonding run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BondingReport {
    pub pair_events: usize,
    pub bonded_from_events: usize,
    pub checked: usize,
    pub bonded_from_lookups: usize,
    pub errors: usize,
}

pub struct BondingTracker {
    chain: Arc<dyn ChainSource>,
    store: Arc<dyn BondingStore>,
    factory: Address,
    wrapped_native: Address,
    blocks_back: u64,
    hours_back: i64,
}

impl BondingTracker {
    pub fn new(
        chain: Arc<dyn ChainSource>,
        store: Arc<dyn BondingStore>,
        settings: &BondingSettings,
    ) -> Self {
        Self {
            chain,
            store,
            factory: settings.factory,
            wrapped_native: settings.wrapped_native,
            blocks_back: settings.blocks_back,
            hours_back: settings.hours_back,
        }
    }

    pub fn with_window(mut self, blocks_back: Option<u64>, hours_back: Option<i64>) -> Self {
        if let Some(blocks) = blocks_back {
            self.blocks_back = blocks;
        }
        if let Some(hours) = hours_back {
            self.hours_back = hours;
        }
        self
    }

    /// Run the event pass, then the lookup pass. The lookup pass also runs
    /// when the event pass fails.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<BondingReport, ScanError> {
        let head = self.chain.block_number().await?;
        let mut report = BondingReport::default();

        if let Err(e) = self.event_pass(head, &mut report).await {
            warn!("Bonding: event scan failed, falling back to getPair lookups: {}", e);
            report.errors += 1;
        }
        if !cancel.is_cancelled() {
            self.lookup_pass(head, &mut report, cancel).await?;
        }

        info!(
            "Bonding: {} pair events, {} bonded from events, {}/{} bonded from lookups, {} errors",
            report.pair_events,
            report.bonded_from_events,
            report.bonded_from_lookups,
            report.checked,
            report.errors
        );

        Ok(report)
    }

    /// The token paired with wrapped native, if this is such a pair.
    fn bonded_token(&self, event: &PairCreated) -> Option<Address> {
        if event.token0 == self.wrapped_native {
            Some(event.token1)
        } else if event.token1 == self.wrapped_native {
            Some(event.token0)
        } else {
            None
        }
    }

    fn pair_query(&self, range: BlockRange) -> LogQuery {
        LogQuery {
            from_block: range.from,
            to_block: range.to,
            addresses: vec![self.factory],
            topic0: PairCreated::SIGNATURE_HASH,
        }
    }

    async fn block_time(&self, block: u64) -> Result<DateTime<Utc>, ScanError> {
        self.chain
            .block_timestamp(block)
            .await?
            .and_then(|ts| DateTime::from_timestamp(i64::try_from(ts).ok()?, 0))
            .ok_or(ScanError::MissingBlock(block))
    }

    async fn event_pass(&self, head: u64, report: &mut BondingReport) -> Result<(), ScanError> {
        let range = BlockRange {
            from: head.saturating_sub(self.blocks_back),
            to: head,
        };
        debug!("Bonding: scanning {} for PairCreated", range);

        for chunk in block_chunks(range, PAIR_SEARCH_CHUNK) {
            let logs = self.chain.get_logs(&self.pair_query(chunk)).await?;

            for log in &logs {
                let Some(event) = decode_pair_created(log) else {
                    continue;
                };
                report.pair_events += 1;

                let Some(token) = self.bonded_token(&event) else {
                    continue;
                };

                let update = BondingUpdate {
                    token_address: address_to_db(&token),
                    pair_address: address_to_db(&event.pair),
                    bonded_at: Some(self.block_time(log.block_number).await?),
                    bonded_block: Some(log.block_number),
                    bonding_error: None,
                };

                if self.store.mark_bonded(&update).await? {
                    info!(
                        "Bonded token from events: {} (pair {})",
                        update.token_address, update.pair_address
                    );
                    report.bonded_from_events += 1;
                }
            }
        }

        Ok(())
    }

    async fn lookup_pass(
        &self,
        head: u64,
        report: &mut BondingReport,
        cancel: &CancellationToken,
    ) -> Result<(), ScanError> {
        let candidates = self.store.bonding_candidates(self.hours_back).await?;
        info!(
            "Bonding: checking {} deployments from the last {}h",
            candidates.len(),
            self.hours_back
        );

        for candidate in candidates {
            if cancel.is_cancelled() {
                break;
            }

            let Some(token) = normalize_address(&candidate.token_address) else {
                warn!("Bonding: skipping malformed token address {}", candidate.token_address);
                continue;
            };
            report.checked += 1;

            let pair = match self.chain.get_pair(self.factory, token, self.wrapped_native).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Bonding: getPair failed for {}: {}", candidate.token_address, e);
                    self.store
                        .record_bonding_error(
                            &candidate.token_address,
                            &format!("check failed: {}", e),
                        )
                        .await?;
                    report.errors += 1;
                    continue;
                },
            };

            if pair == Address::ZERO {
                continue;
            }

            let update = self.lookup_update(&candidate, token, pair, head).await;
            if self.store.mark_bonded(&update).await? {
                info!(
                    "Bonded token from lookup: {} (pair {})",
                    update.token_address, update.pair_address
                );
                report.bonded_from_lookups += 1;
            }
        }

        Ok(())
    }

    async fn lookup_update(
        &self,
        candidate: &BondingCandidate,
        token: Address,
        pair: Address,
        head: u64,
    ) -> BondingUpdate {
        let mut update = BondingUpdate {
            token_address: candidate.token_address.clone(),
            pair_address: address_to_db(&pair),
            bonded_at: None,
            bonded_block: None,
            bonding_error: Some(UNKNOWN_BONDING_TIME.to_string()),
        };

        match self.find_pair_creation(token, candidate.block_number, head).await {
            Ok(Some((block, time))) => {
                update.bonded_at = Some(time);
                update.bonded_block = Some(block);
                update.bonding_error = None;
            },
            Ok(None) => {},
            Err(e) => warn!(
                "Bonding: creation search failed for {}: {}",
                candidate.token_address, e
            ),
        }

        update
    }

    /// Block and time of the `PairCreated` event pairing `token` with the
    /// wrapped native token, searching forward from `from_block`.
    async fn find_pair_creation(
        &self,
        token: Address,
        from_block: u64,
        head: u64,
    ) -> Result<Option<(u64, DateTime<Utc>)>, ScanError> {
        let Some(range) = BlockRange::new(from_block, head) else {
            return Ok(None);
        };

        for chunk in block_chunks(range, PAIR_SEARCH_CHUNK) {
            let logs = self.chain.get_logs(&self.pair_query(chunk)).await?;

            let found = logs.iter().find(|log| {
                decode_pair_created(log).is_some_and(|e| self.bonded_token(&e) == Some(token))
            });

            if let Some(log) = found {
                let time = self.block_time(log.block_number).await?;
                return Ok(Some((log.block_number, time)));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pair_created_log, tx_hash, MemoryStore, MockChain};
    use alloy::primitives::address;

    const FACTORY: Address = address!("0xf16784dcaf838a3e16bef7711a62d12413c39bd1");
    const WAVAX: Address = address!("0xb31f66aa3c1e785363f0875a1b74e27b85fd66c7");
    const TOKEN_A: Address = address!("0xa000000000000000000000000000000000000001");
    const TOKEN_B: Address = address!("0xb000000000000000000000000000000000000002");
    const TOKEN_C: Address = address!("0xc000000000000000000000000000000000000003");
    const TOKEN_D: Address = address!("0xd000000000000000000000000000000000000004");
    const PAIR_A: Address = address!("0x1a00000000000000000000000000000000000001");
    const PAIR_B: Address = address!("0x1b00000000000000000000000000000000000002");
    const PAIR_C: Address = address!("0x1c00000000000000000000000000000000000003");

    fn settings() -> BondingSettings {
        BondingSettings {
            factory: FACTORY,
            wrapped_native: WAVAX,
            blocks_back: 1_000,
            hours_back: 24,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_event_pass_marks_recent_wavax_pairs() {
        let chain = MockChain::with_head(10_000);
        // Recent WAVAX pair, token on either side
        chain.add_log(pair_created_log(WAVAX, TOKEN_A, PAIR_A, 9_500, tx_hash(1)));
        // Not paired with WAVAX
        chain.add_log(pair_created_log(TOKEN_B, TOKEN_C, PAIR_B, 9_600, tx_hash(2)));
        chain.set_block_timestamp(9_500, 1_700_000_000);

        let store = MemoryStore::default();
        store.seed_unbonded(TOKEN_A, 9_000);
        store.seed_unbonded(TOKEN_B, 9_000);

        let tracker = BondingTracker::new(Arc::new(chain), Arc::new(store.clone()), &settings());
        let report = tracker.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.pair_events, 2);
        assert_eq!(report.bonded_from_events, 1);

        let bonded = store.bonding(&address_to_db(&TOKEN_A)).unwrap();
        assert_eq!(bonded.pair_address, address_to_db(&PAIR_A));
        assert_eq!(bonded.bonded_block, Some(9_500));
        assert_eq!(bonded.bonded_at.map(|t| t.timestamp()), Some(1_700_000_000));
        assert!(store.bonding(&address_to_db(&TOKEN_B)).is_none());
    }

    #[tokio::test]
    async fn test_lookup_pass_finds_creation_block() {
        let chain = MockChain::with_head(20_000);
        // Older than the event window
        chain.add_log(pair_created_log(TOKEN_C, WAVAX, PAIR_C, 13_500, tx_hash(3)));
        chain.set_block_timestamp(13_500, 1_700_000_500);
        chain.set_pair(TOKEN_C, WAVAX, PAIR_C);

        let store = MemoryStore::default();
        store.seed_unbonded(TOKEN_C, 12_000);

        let tracker = BondingTracker::new(Arc::new(chain), Arc::new(store.clone()), &settings());
        let report = tracker.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.bonded_from_events, 0);
        assert_eq!(report.checked, 1);
        assert_eq!(report.bonded_from_lookups, 1);

        let bonded = store.bonding(&address_to_db(&TOKEN_C)).unwrap();
        assert_eq!(bonded.bonded_block, Some(13_500));
        assert_eq!(bonded.bonding_error, None);
    }

    #[tokio::test]
    async fn test_lookup_without_creation_event_records_unknown_time() {
        let chain = MockChain::with_head(20_000);
        chain.set_pair(TOKEN_D, WAVAX, PAIR_C);

        let store = MemoryStore::default();
        store.seed_unbonded(TOKEN_D, 15_000);
        store.seed_unbonded(TOKEN_A, 15_000);

        let tracker = BondingTracker::new(Arc::new(chain), Arc::new(store.clone()), &settings());
        let report = tracker.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.checked, 2);
        assert_eq!(report.bonded_from_lookups, 1);

        let bonded = store.bonding(&address_to_db(&TOKEN_D)).unwrap();
        assert_eq!(bonded.bonded_at, None);
        assert_eq!(bonded.bonding_error.as_deref(), Some(UNKNOWN_BONDING_TIME));
        // No pair yet: still bonding
        assert!(store.bonding(&address_to_db(&TOKEN_A)).is_none());
    }

    #[tokio::test]
    async fn test_failed_lookup_records_error_and_continues() {
        let chain = MockChain::with_head(20_000);
        chain.fail_get_pair(TOKEN_A, "reverted");
        chain.set_pair(TOKEN_B, WAVAX, PAIR_B);

        let store = MemoryStore::default();
        store.seed_unbonded(TOKEN_A, 19_000);
        store.seed_unbonded(TOKEN_B, 19_000);

        let tracker = BondingTracker::new(Arc::new(chain), Arc::new(store.clone()), &settings());
        let report = tracker.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.errors, 1);
        assert_eq!(report.bonded_from_lookups, 1);
        assert!(store
            .bonding_error(&address_to_db(&TOKEN_A))
            .is_some_and(|e| e.contains("reverted")));
    }

    #[tokio::test]
    async fn test_event_pass_failure_falls_back_to_lookups() {
        let chain = MockChain::with_head(20_000);
        chain.fail_logs_in(BlockRange::new(19_000, 20_000).unwrap());
        chain.set_pair(TOKEN_B, WAVAX, PAIR_B);

        let store = MemoryStore::default();
        store.seed_unbonded(TOKEN_B, 19_500);

        let tracker = BondingTracker::new(Arc::new(chain), Arc::new(store.clone()), &settings());
        let report = tracker.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.errors, 1);
        assert_eq!(report.checked, 1);
        assert_eq!(report.bonded_from_lookups, 1);

        // creation search hits the same failing range
        let bonded = store.bonding(&address_to_db(&TOKEN_B)).unwrap();
        assert_eq!(bonded.pair_address, address_to_db(&PAIR_B));
        assert_eq!(bonded.bonding_error.as_deref(), Some(UNKNOWN_BONDING_TIME));
    }
}
