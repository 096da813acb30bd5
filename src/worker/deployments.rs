//! Arena token deployment scanner.
//!
//! Follows `TokenCreated` events of the token manager and stores one row per
//! launched token, enriched with the deploy transaction, the block time and
//! the token's ERC-20 metadata.

use std::{sync::Arc, time::Duration};

use alloy::{primitives::Address, sol_types::SolEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use moka::future::Cache;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;

use crate::{
    abis::TokenCreated,
    config::{DeploymentSettings, ScannerSettings},
    db::{models::TokenDeployment, store::DeploymentStore},
    error::ScanError,
    rpc::{ChainLog, ChainSource, LogQuery, TokenMetadata},
    utils::{address_to_db, hex_encode, u256_to_f64, BlockRange},
    worker::{
        parser::decode_token_created,
        scanner::{scan_incremental, ChunkProcessor, ChunkStats, ScanOptions, ScanSummary},
    },
};

/// Checkpoint key of the incremental deployment scan.
pub const DEPLOYMENTS_SCANNER: &str = "token_deployments";

const UNKNOWN_NAME: &str = "Unknown";
const UNKNOWN_SYMBOL: &str = "UNKNOWN";
const DEFAULT_DECIMALS: u8 = 18;
const NATIVE_DECIMALS: u8 = 18;

/// Metadata lookups with a TTL cache for hits and for tokens that failed.
pub struct MetadataCache {
    known: Cache<Address, TokenMetadata>,
    invalid: Cache<Address, ()>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self {
            known: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(3600))
                .build(),
            // Retried after the TTL in case the contract was not yet readable
            invalid: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(600))
                .build(),
        }
    }

    /// Metadata for `tokens`. Tokens that cannot be read are absent from the
    /// result; an RPC failure is logged and treated the same way.
    pub async fn get(
        &self,
        chain: &dyn ChainSource,
        tokens: &[Address],
    ) -> FxHashMap<Address, TokenMetadata> {
        let mut result = FxHashMap::default();
        let mut missing = Vec::new();

        for token in tokens {
            if let Some(meta) = self.known.get(token).await {
                result.insert(*token, meta);
            } else if !self.invalid.contains_key(token) && !missing.contains(token) {
                missing.push(*token);
            }
        }

        if missing.is_empty() {
            return result;
        }

        match chain.token_metadata(&missing).await {
            Ok(fetched) => {
                for (token, meta) in missing.iter().zip(fetched) {
                    match meta {
                        Some(meta) => {
                            self.known.insert(*token, meta.clone()).await;
                            result.insert(*token, meta);
                        },
                        None => self.invalid.insert(*token, ()).await,
                    }
                }
            },
            Err(e) => warn!(
                "[{}] Metadata lookup for {} tokens failed: {}",
                DEPLOYMENTS_SCANNER,
                missing.len(),
                e
            ),
        }

        result
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DeploymentProcessor {
    chain: Arc<dyn ChainSource>,
    store: Arc<dyn DeploymentStore>,
    token_manager: Address,
    metadata: MetadataCache,
}

impl DeploymentProcessor {
    pub fn new(
        chain: Arc<dyn ChainSource>,
        store: Arc<dyn DeploymentStore>,
        token_manager: Address,
    ) -> Self {
        Self {
            chain,
            store,
            token_manager,
            metadata: MetadataCache::new(),
        }
    }

    async fn block_time(
        &self,
        block: u64,
        cache: &mut FxHashMap<u64, DateTime<Utc>>,
    ) -> Result<DateTime<Utc>, ScanError> {
        if let Some(time) = cache.get(&block) {
            return Ok(*time);
        }

        let timestamp = self
            .chain
            .block_timestamp(block)
            .await?
            .ok_or(ScanError::MissingBlock(block))?;
        let time = i64::try_from(timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or(ScanError::MissingBlock(block))?;

        cache.insert(block, time);
        Ok(time)
    }

    async fn build(
        &self,
        log: &ChainLog,
        event: &TokenCreated,
        metadata: Option<&TokenMetadata>,
        block_times: &mut FxHashMap<u64, DateTime<Utc>>,
    ) -> Result<TokenDeployment, ScanError> {
        let tx = self
            .chain
            .transaction(log.tx_hash)
            .await?
            .ok_or(ScanError::MissingTransaction(log.tx_hash))?;
        let deployed_at = self.block_time(log.block_number, block_times).await?;

        let params = &event.params;

        Ok(TokenDeployment {
            token_address: address_to_db(&params.tokenContractAddress),
            token_id: event.tokenId,
            creator: address_to_db(&params.creatorAddress),
            deployer_wallet: address_to_db(&tx.from),
            tx_hash: hex_encode(log.tx_hash.as_slice()),
            block_number: log.block_number,
            deployed_at,
            name: metadata
                .map(|m| m.name.clone())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            symbol: metadata
                .map(|m| m.symbol.clone())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNKNOWN_SYMBOL.to_string()),
            decimals: metadata.map(|m| m.decimals).unwrap_or(DEFAULT_DECIMALS),
            total_supply: metadata
                .and_then(|m| m.total_supply)
                .unwrap_or(event.tokenSupply),
            deployment_value: u256_to_f64(tx.value, NATIVE_DECIMALS),
        })
    }
}

#[async_trait]
impl ChunkProcessor for DeploymentProcessor {
    fn name(&self) -> &'static str {
        DEPLOYMENTS_SCANNER
    }

    async fn process(&self, chunk: BlockRange) -> Result<ChunkStats, ScanError> {
        let logs = self
            .chain
            .get_logs(&LogQuery {
                from_block: chunk.from,
                to_block: chunk.to,
                addresses: vec![self.token_manager],
                topic0: TokenCreated::SIGNATURE_HASH,
            })
            .await?;

        let events: Vec<(&ChainLog, TokenCreated)> = logs
            .iter()
            .filter_map(|log| match decode_token_created(log) {
                Some(event) if event.params.tokenContractAddress != Address::ZERO => {
                    Some((log, event))
                },
                Some(_) => None,
                None => {
                    warn!(
                        "[{}] Undecodable TokenCreated log {}:{} in tx {}",
                        DEPLOYMENTS_SCANNER, log.block_number, log.log_index, log.tx_hash
                    );
                    None
                },
            })
            .collect();

        if events.is_empty() {
            return Ok(ChunkStats {
                logs: logs.len(),
                rows: 0,
            });
        }

        let tokens: Vec<Address> = events
            .iter()
            .map(|(_, e)| e.params.tokenContractAddress)
            .collect();
        let metadata = self.metadata.get(self.chain.as_ref(), &tokens).await;

        let mut block_times = FxHashMap::default();
        let mut deployments = Vec::with_capacity(events.len());

        for (log, event) in &events {
            let meta = metadata.get(&event.params.tokenContractAddress);
            if meta.is_none() {
                debug!(
                    "[{}] No metadata for {}, using defaults",
                    DEPLOYMENTS_SCANNER, event.params.tokenContractAddress
                );
            }
            deployments.push(self.build(log, event, meta, &mut block_times).await?);
        }

        let rows = self.store.insert_deployments(&deployments).await?;

        if rows > 0 {
            info!(
                "[{}] {} new deployments in {}",
                DEPLOYMENTS_SCANNER, rows, chunk
            );
        }

        Ok(ChunkStats {
            logs: logs.len(),
            rows,
        })
    }
}

/// One incremental deployment scan from the checkpoint to head (or `limit`).
pub async fn scan_deployments(
    chain: Arc<dyn ChainSource>,
    store: Arc<dyn DeploymentStore>,
    deployments: &DeploymentSettings,
    scanner: &ScannerSettings,
    limit: Option<u64>,
    cancel: &CancellationToken,
) -> Result<ScanSummary, ScanError> {
    let processor =
        DeploymentProcessor::new(chain.clone(), store.clone(), deployments.token_manager);

    scan_incremental(
        chain.as_ref(),
        store.as_ref(),
        &processor,
        &ScanOptions::for_deployments(deployments, scanner),
        limit,
        cancel,
    )
    .await
}
