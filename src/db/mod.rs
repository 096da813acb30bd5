use std::sync::Arc;

use log::info;

use crate::config::PostgresSettings;

pub mod models;
pub mod postgres;
pub mod store;

pub use postgres::PostgresClient;
pub use store::{BondingStore, CheckpointStore, DeploymentStore, TradeStore};

/// Database handle shared by scanners, jobs and the CLI.
///
/// PostgreSQL holds everything: deployments, trades, labels and checkpoints.
#[derive(Clone)]
pub struct Database {
    pub postgres: Arc<PostgresClient>,
}

impl Database {
    /// Connect and apply the schema.
    pub async fn new(settings: &PostgresSettings) -> anyhow::Result<Self> {
        let postgres = PostgresClient::new(settings.clone()).await?;
        postgres.migrate().await?;

        info!("Database ready");

        Ok(Self {
            postgres: Arc::new(postgres),
        })
    }
}
