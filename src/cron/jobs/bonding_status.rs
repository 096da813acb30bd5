//! Job to mark deployments whose token migrated to a DEX pair.
//!
//! Wraps [`BondingTracker`] with the configured window. The CLI `bonding`
//! command runs the same tracker once.

use std::sync::Arc;

use anyhow::Result;
use log::info;
use tokio_util::sync::CancellationToken;

use crate::{
    config::BondingSettings,
    db::{BondingStore, Database},
    rpc::ChainSource,
    worker::bonding::BondingTracker,
};

pub async fn run(
    chain: Arc<dyn ChainSource>,
    db: &Database,
    settings: &BondingSettings,
    cancel: &CancellationToken,
) -> Result<()> {
    info!("Starting bonding_status job...");

    let start = std::time::Instant::now();
    let store: Arc<dyn BondingStore> = db.postgres.clone();
    let report = BondingTracker::new(chain, store, settings).run(cancel).await?;

    info!(
        "Completed bonding_status job in {:?} ({} bonded from events, {} from lookups)",
        start.elapsed(),
        report.bonded_from_events,
        report.bonded_from_lookups
    );
    Ok(())
}
