//! Storage seams used by the scanners.
//!
//! [`PostgresClient`](super::PostgresClient) implements every trait here;
//! tests use an in-memory store.

use async_trait::async_trait;

use crate::db::models::{
    BondingCandidate, BondingUpdate, RouterTrade, TargetTokenRow, TokenDeployment,
};

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Last fully processed block for `scanner`, if any.
    async fn get_checkpoint(&self, scanner: &str) -> anyhow::Result<Option<u64>>;

    /// Record progress. Never moves an existing checkpoint backwards.
    async fn set_checkpoint(&self, scanner: &str, block: u64) -> anyhow::Result<()>;
}

#[async_trait]
pub trait TradeStore: CheckpointStore {
    async fn load_target_tokens(&self) -> anyhow::Result<Vec<TargetTokenRow>>;

    /// Insert trades, skipping ones already stored. Returns the number of new rows.
    async fn insert_trades(&self, trades: &[RouterTrade]) -> anyhow::Result<u64>;
}

#[async_trait]
pub trait DeploymentStore: CheckpointStore {
    /// Insert deployments, skipping known ones, and bump deployer statistics
    /// for the new rows only. Returns the number of new deployments.
    async fn insert_deployments(&self, deployments: &[TokenDeployment]) -> anyhow::Result<u64>;
}

#[async_trait]
pub trait BondingStore: Send + Sync {
    /// Unbonded deployments younger than `hours_back` without a recorded error.
    async fn bonding_candidates(&self, hours_back: i64) -> anyhow::Result<Vec<BondingCandidate>>;

    /// Mark a known, not yet bonded token as migrated. Returns false when the
    /// token is unknown or already bonded.
    async fn mark_bonded(&self, update: &BondingUpdate) -> anyhow::Result<bool>;

    async fn record_bonding_error(&self, token_address: &str, error: &str) -> anyhow::Result<()>;
}
