//! Cron scheduler for periodic background tasks.
//!
//! Runs:
//! - Bonding detection (PairCreated events plus getPair lookups)
//! - Router trade counters on token_deployments

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use log::{error, info, warn};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{BondingSettings, Settings},
    db::Database,
    rpc::ChainSource,
};

use super::jobs;

/// Cron scheduler that manages periodic background jobs.
pub struct CronScheduler {
    db: Arc<Database>,
    chain: Arc<dyn ChainSource>,
    bonding: BondingSettings,
    settings: CronSettings,
}

/// Configuration for cron job intervals
#[derive(Debug, Clone)]
pub struct CronSettings {
    /// Interval for bonding detection
    pub bonding_interval_secs: u64,
    /// Interval for refreshing router trade counters
    pub trade_stats_interval_secs: u64,
}

impl From<&Settings> for CronSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            bonding_interval_secs: settings.bonding.interval_secs,
            trade_stats_interval_secs: settings.stats.interval_secs,
        }
    }
}

impl CronScheduler {
    pub fn new(
        db: Arc<Database>,
        chain: Arc<dyn ChainSource>,
        bonding: BondingSettings,
        settings: CronSettings,
    ) -> Self {
        Self {
            db,
            chain,
            bonding,
            settings,
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        self.register_bonding_status_job(&scheduler, cancellation_token.clone())
            .await?;
        self.register_trade_stats_job(&scheduler).await?;

        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", 2);

        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_bonding_status_job(
        &self,
        scheduler: &JobScheduler,
        cancel: CancellationToken,
    ) -> Result<()> {
        let db = self.db.clone();
        let chain = self.chain.clone();
        let bonding = self.bonding.clone();
        let interval = self.settings.bonding_interval_secs;
        // A slow run must not overlap with the next tick
        let running = Arc::new(Mutex::new(()));

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let db = db.clone();
            let chain = chain.clone();
            let bonding = bonding.clone();
            let cancel = cancel.clone();
            let running = running.clone();
            Box::pin(async move {
                let Ok(_guard) = running.try_lock() else {
                    warn!("Previous bonding_status run still in progress, skipping");
                    return;
                };
                if let Err(e) = jobs::bonding_status::run(chain, &db, &bonding, &cancel).await {
                    error!("Failed to update bonding status: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered bonding_status job (every {}s)", interval);
        Ok(())
    }

    async fn register_trade_stats_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let db = self.db.clone();
        let interval = self.settings.trade_stats_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let db = db.clone();
            Box::pin(async move {
                if let Err(e) = jobs::trade_stats::run(&db).await {
                    error!("Failed to refresh trade stats: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered trade_stats job (every {}s)", interval);
        Ok(())
    }
}

