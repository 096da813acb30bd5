//! Chain access.
//!
//! [`ChainSource`] is the seam between scanners and the network. The
//! production implementation is [`RpcClient`], which rotates over several
//! JSON-RPC endpoints with one retry policy and a shared request budget.

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;

use crate::error::RpcError;

pub mod client;
pub mod metadata;
pub mod policy;

pub use client::RpcClient;
pub use metadata::TokenMetadata;
pub use policy::{RequestBudget, RetryPolicy};

/// `eth_getLogs` filter restricted to what the scanners need: an inclusive
/// block range, optional emitting contracts and a single topic0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub from_block: u64,
    pub to_block: u64,
    pub addresses: Vec<Address>,
    pub topic0: B256,
}

/// A log as returned by the node, with the fields every scanner needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
}

/// Transaction fields needed to attribute a log to its initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxInfo {
    pub hash: B256,
    pub from: Address,
    pub value: U256,
}

/// Read access to an EVM chain.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Current chain head.
    async fn block_number(&self) -> Result<u64, RpcError>;

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<ChainLog>, RpcError>;

    /// `None` if the node does not know the transaction.
    async fn transaction(&self, hash: B256) -> Result<Option<TxInfo>, RpcError>;

    /// Block timestamp in unix seconds, `None` if the block is unknown.
    async fn block_timestamp(&self, block: u64) -> Result<Option<u64>, RpcError>;

    /// `factory.getPair(token_a, token_b)`; the zero address means no pair.
    async fn get_pair(
        &self,
        factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<Address, RpcError>;

    /// ERC-20 metadata for each token, index-aligned with `tokens`.
    async fn token_metadata(
        &self,
        tokens: &[Address],
    ) -> Result<Vec<Option<TokenMetadata>>, RpcError>;
}
