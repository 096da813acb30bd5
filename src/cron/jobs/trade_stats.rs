//! Job to refresh router buy/sell counters on token_deployments.
//!
//! Recomputes the counters from arena.router_trades and only touches
//! deployments whose values changed.

use anyhow::Result;
use log::info;

use crate::db::Database;

pub async fn run(db: &Database) -> Result<()> {
    info!("Starting trade_stats job...");

    let start = std::time::Instant::now();
    let updated = db.postgres.refresh_trade_stats().await?;

    info!(
        "Completed trade_stats job in {:?} ({} deployments updated)",
        start.elapsed(),
        updated
    );
    Ok(())
}
