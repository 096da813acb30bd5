//! In-memory chain and store used by unit tests.

use std::sync::{Arc, Mutex};

use alloy::{
    primitives::{address, Address, LogData, B256, U256},
    sol_types::SolEvent,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;

use crate::{
    abis::{PairCreated, TokenCreated, TokenParameters, Transfer},
    db::{
        models::{BondingCandidate, BondingUpdate, RouterTrade, TargetTokenRow, TokenDeployment},
        store::{BondingStore, CheckpointStore, DeploymentStore, TradeStore},
    },
    error::RpcError,
    rpc::{ChainLog, ChainSource, LogQuery, TokenMetadata, TxInfo},
    utils::{address_to_db, BlockRange},
};

pub const FACTORY: Address = address!("0xf16784dcaf838a3e16bef7711a62d12413c39bd1");

pub fn tx_hash(n: u8) -> B256 {
    B256::with_last_byte(n)
}

fn chain_log(address: Address, data: LogData, block: u64, tx: B256, log_index: u64) -> ChainLog {
    ChainLog {
        address,
        topics: data.topics().to_vec(),
        data: data.data,
        block_number: block,
        tx_hash: tx,
        log_index,
    }
}

pub fn transfer_log(
    token: Address,
    from: Address,
    to: Address,
    value: U256,
    block: u64,
    tx: B256,
    log_index: u64,
) -> ChainLog {
    let event = Transfer { from, to, value };
    chain_log(token, event.encode_log_data(), block, tx, log_index)
}

pub fn pair_created_log(
    token0: Address,
    token1: Address,
    pair: Address,
    block: u64,
    tx: B256,
) -> ChainLog {
    let event = PairCreated {
        token0,
        token1,
        pair,
        _3: U256::from(1),
    };
    chain_log(FACTORY, event.encode_log_data(), block, tx, 0)
}

pub fn token_created_log(
    emitter: Address,
    id: u64,
    token: Address,
    creator: Address,
    supply: U256,
    block: u64,
    tx: B256,
) -> ChainLog {
    let event = TokenCreated {
        tokenId: U256::from(id),
        params: TokenParameters {
            curveScaler: 1,
            a: 677,
            b: 0,
            lpDeployed: false,
            lpPercentage: 20,
            salePercentage: 73,
            creatorFeeBasisPoints: 0,
            creatorAddress: creator,
            pairAddress: Address::ZERO,
            tokenContractAddress: token,
        },
        tokenSupply: supply,
    };
    chain_log(emitter, event.encode_log_data(), block, tx, 0)
}

#[derive(Default)]
struct ChainState {
    head: u64,
    logs: Vec<ChainLog>,
    transactions: FxHashMap<B256, TxInfo>,
    timestamps: FxHashMap<u64, u64>,
    metadata: FxHashMap<Address, TokenMetadata>,
    pairs: Vec<(Address, Address, Address)>,
    pair_failures: FxHashMap<Address, String>,
    failing_ranges: Vec<BlockRange>,
    transaction_calls: FxHashMap<B256, usize>,
    requested_ranges: Vec<BlockRange>,
    metadata_calls: usize,
}

/// Scripted chain: logs, transactions and blocks are whatever the test adds.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn with_head(head: u64) -> Self {
        let chain = Self::default();
        chain.state.lock().unwrap().head = head;
        chain
    }

    pub fn add_log(&self, log: ChainLog) {
        self.state.lock().unwrap().logs.push(log);
    }

    pub fn add_transaction(&self, hash: B256, from: Address) {
        self.add_transaction_with_value(hash, from, U256::ZERO);
    }

    pub fn add_transaction_with_value(&self, hash: B256, from: Address, value: U256) {
        self.state
            .lock()
            .unwrap()
            .transactions
            .insert(hash, TxInfo { hash, from, value });
    }

    pub fn set_block_timestamp(&self, block: u64, timestamp: u64) {
        self.state.lock().unwrap().timestamps.insert(block, timestamp);
    }

    pub fn set_metadata(&self, metadata: TokenMetadata) {
        self.state.lock().unwrap().metadata.insert(metadata.address, metadata);
    }

    pub fn set_pair(&self, token_a: Address, token_b: Address, pair: Address) {
        self.state.lock().unwrap().pairs.push((token_a, token_b, pair));
    }

    /// `getPair` involving `token` fails with `message`.
    pub fn fail_get_pair(&self, token: Address, message: &str) {
        self.state
            .lock()
            .unwrap()
            .pair_failures
            .insert(token, message.to_string());
    }

    /// `eth_getLogs` overlapping `range` fails.
    pub fn fail_logs_in(&self, range: BlockRange) {
        self.state.lock().unwrap().failing_ranges.push(range);
    }

    pub fn transaction_calls(&self, hash: B256) -> usize {
        self.state
            .lock()
            .unwrap()
            .transaction_calls
            .get(&hash)
            .copied()
            .unwrap_or(0)
    }

    pub fn get_logs_calls(&self) -> usize {
        self.state.lock().unwrap().requested_ranges.len()
    }

    pub fn requested_ranges(&self) -> Vec<BlockRange> {
        self.state.lock().unwrap().requested_ranges.clone()
    }

    pub fn metadata_calls(&self) -> usize {
        self.state.lock().unwrap().metadata_calls
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(self.state.lock().unwrap().head)
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<ChainLog>, RpcError> {
        let mut state = self.state.lock().unwrap();
        let range = BlockRange {
            from: query.from_block,
            to: query.to_block,
        };
        state.requested_ranges.push(range);

        if state
            .failing_ranges
            .iter()
            .any(|r| r.from <= range.to && range.from <= r.to)
        {
            return Err(RpcError::Transport("connection reset".into()));
        }

        let mut logs: Vec<ChainLog> = state
            .logs
            .iter()
            .filter(|log| range.contains(log.block_number))
            .filter(|log| log.topics.first() == Some(&query.topic0))
            .filter(|log| query.addresses.is_empty() || query.addresses.contains(&log.address))
            .cloned()
            .collect();
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    async fn transaction(&self, hash: B256) -> Result<Option<TxInfo>, RpcError> {
        let mut state = self.state.lock().unwrap();
        *state.transaction_calls.entry(hash).or_default() += 1;
        Ok(state.transactions.get(&hash).copied())
    }

    async fn block_timestamp(&self, block: u64) -> Result<Option<u64>, RpcError> {
        Ok(self.state.lock().unwrap().timestamps.get(&block).copied())
    }

    async fn get_pair(
        &self,
        _factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<Address, RpcError> {
        let state = self.state.lock().unwrap();
        for token in [token_a, token_b] {
            if let Some(message) = state.pair_failures.get(&token) {
                return Err(RpcError::Decode(message.clone()));
            }
        }

        Ok(state
            .pairs
            .iter()
            .find(|(a, b, _)| (*a == token_a && *b == token_b) || (*a == token_b && *b == token_a))
            .map(|(_, _, pair)| *pair)
            .unwrap_or(Address::ZERO))
    }

    async fn token_metadata(
        &self,
        tokens: &[Address],
    ) -> Result<Vec<Option<TokenMetadata>>, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.metadata_calls += 1;
        Ok(tokens.iter().map(|t| state.metadata.get(t).cloned()).collect())
    }
}

struct KnownToken {
    address: String,
    block_number: u64,
    deployed_at: DateTime<Utc>,
}

#[derive(Default)]
struct StoreState {
    checkpoints: FxHashMap<String, u64>,
    checkpoint_writes: FxHashMap<String, Vec<u64>>,
    targets: Vec<TargetTokenRow>,
    trades: Vec<RouterTrade>,
    deployments: Vec<TokenDeployment>,
    deployer_counts: FxHashMap<String, u64>,
    known: Vec<KnownToken>,
    bonded: FxHashMap<String, BondingUpdate>,
    errors: FxHashMap<String, String>,
}

/// Store with the same uniqueness and monotonicity rules as the Postgres
/// schema. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn seed_checkpoint(&self, scanner: &str, block: u64) {
        self.state
            .lock()
            .unwrap()
            .checkpoints
            .insert(scanner.to_string(), block);
    }

    pub fn checkpoint(&self, scanner: &str) -> Option<u64> {
        self.state.lock().unwrap().checkpoints.get(scanner).copied()
    }

    /// Every `set_checkpoint` call, in order.
    pub fn checkpoint_writes(&self, scanner: &str) -> Vec<u64> {
        self.state
            .lock()
            .unwrap()
            .checkpoint_writes
            .get(scanner)
            .cloned()
            .unwrap_or_default()
    }

    pub fn seed_target(&self, token: Address, decimals: i16) {
        self.state.lock().unwrap().targets.push(TargetTokenRow {
            token_address: address_to_db(&token),
            decimals: Some(decimals),
        });
    }

    /// Unbonded deployment created now.
    pub fn seed_unbonded(&self, token: Address, block_number: u64) {
        self.state.lock().unwrap().known.push(KnownToken {
            address: address_to_db(&token),
            block_number,
            deployed_at: Utc::now(),
        });
    }

    pub fn trades(&self) -> Vec<RouterTrade> {
        self.state.lock().unwrap().trades.clone()
    }

    pub fn deployments(&self) -> Vec<TokenDeployment> {
        self.state.lock().unwrap().deployments.clone()
    }

    pub fn deployer_count(&self, wallet: &str) -> Option<u64> {
        self.state.lock().unwrap().deployer_counts.get(wallet).copied()
    }

    pub fn bonding(&self, token: &str) -> Option<BondingUpdate> {
        self.state.lock().unwrap().bonded.get(token).cloned()
    }

    pub fn bonding_error(&self, token: &str) -> Option<String> {
        self.state.lock().unwrap().errors.get(token).cloned()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn get_checkpoint(&self, scanner: &str) -> anyhow::Result<Option<u64>> {
        Ok(self.checkpoint(scanner))
    }

    async fn set_checkpoint(&self, scanner: &str, block: u64) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .checkpoint_writes
            .entry(scanner.to_string())
            .or_default()
            .push(block);
        let current = state.checkpoints.entry(scanner.to_string()).or_insert(block);
        *current = (*current).max(block);
        Ok(())
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn load_target_tokens(&self) -> anyhow::Result<Vec<TargetTokenRow>> {
        let state = self.state.lock().unwrap();
        let deployed = state.deployments.iter().map(|d| TargetTokenRow {
            token_address: d.token_address.clone(),
            decimals: Some(i16::from(d.decimals)),
        });
        Ok(state.targets.iter().cloned().chain(deployed).collect())
    }

    async fn insert_trades(&self, trades: &[RouterTrade]) -> anyhow::Result<u64> {
        let mut state = self.state.lock().unwrap();
        let mut inserted = 0;
        for trade in trades {
            let exists = state
                .trades
                .iter()
                .any(|t| t.tx_hash == trade.tx_hash && t.log_index == trade.log_index);
            if !exists {
                state.trades.push(trade.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn insert_deployments(&self, deployments: &[TokenDeployment]) -> anyhow::Result<u64> {
        let mut state = self.state.lock().unwrap();
        let mut inserted = 0;
        for deployment in deployments {
            let exists = state.deployments.iter().any(|d| {
                d.token_address == deployment.token_address || d.tx_hash == deployment.tx_hash
            });
            if exists {
                continue;
            }
            state.deployments.push(deployment.clone());
            state.known.push(KnownToken {
                address: deployment.token_address.clone(),
                block_number: deployment.block_number,
                deployed_at: deployment.deployed_at,
            });
            *state
                .deployer_counts
                .entry(deployment.deployer_wallet.clone())
                .or_default() += 1;
            inserted += 1;
        }
        Ok(inserted)
    }
}

#[async_trait]
impl BondingStore for MemoryStore {
    async fn bonding_candidates(&self, hours_back: i64) -> anyhow::Result<Vec<BondingCandidate>> {
        let state = self.state.lock().unwrap();
        let since = Utc::now() - chrono::Duration::hours(hours_back);
        let mut candidates: Vec<BondingCandidate> = state
            .known
            .iter()
            .filter(|t| t.deployed_at >= since)
            .filter(|t| {
                !state.bonded.contains_key(&t.address) && !state.errors.contains_key(&t.address)
            })
            .map(|t| BondingCandidate {
                token_address: t.address.clone(),
                block_number: t.block_number,
            })
            .collect();
        candidates.sort_by_key(|c| c.block_number);
        Ok(candidates)
    }

    async fn mark_bonded(&self, update: &BondingUpdate) -> anyhow::Result<bool> {
        let mut state = self.state.lock().unwrap();
        let known = state.known.iter().any(|t| t.address == update.token_address);
        if !known || state.bonded.contains_key(&update.token_address) {
            return Ok(false);
        }
        state.bonded.insert(update.token_address.clone(), update.clone());
        Ok(true)
    }

    async fn record_bonding_error(&self, token_address: &str, error: &str) -> anyhow::Result<()> {
        self.state
            .lock()
            .unwrap()
            .errors
            .insert(token_address.to_string(), error.to_string());
        Ok(())
    }
}
