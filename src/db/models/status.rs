use serde::Serialize;

use super::ScanCheckpoint;

/// Snapshot of indexer progress for the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct IndexerStatus {
    pub checkpoints: Vec<ScanCheckpoint>,
    pub deployments: i64,
    pub bonded: i64,
    pub deployer_wallets: i64,
    pub router_trades: i64,
    pub wallet_labels: i64,
}
