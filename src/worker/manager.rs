use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Settings,
    db::store::{DeploymentStore, TradeStore},
    error::ScanError,
    rpc::{ChainSource, RpcClient},
    worker::{
        deployments::{scan_deployments, DEPLOYMENTS_SCANNER},
        scanner::ScanSummary,
        trades::{scan_trades, TRADES_SCANNER},
    },
    Database,
};

/// How often the manager checks for stopped scanners
const SUPERVISE_INTERVAL: Duration = Duration::from_secs(10);

/// Time given to a scanner to flush its checkpoint on shutdown
const STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Represents a running scanner task
struct RunningScanner {
    name: &'static str,
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Keeps the continuous scanners running
///
/// Features:
/// - One follower task per scanner (trades, deployments), each with its own RPC client
/// - Followers scan to head, then sleep for the poll interval
/// - Followers that stop unexpectedly are restarted
/// - Graceful shutdown waits for the current chunk and the checkpoint flush
pub struct ScannerManager {
    running: Vec<RunningScanner>,
    settings: Arc<Settings>,
    db: Arc<Database>,
}

/// Scan to head, sleep, repeat until cancelled. Failed runs are logged and
/// retried after the same interval.
async fn follow<F, Fut>(
    name: &'static str,
    poll_interval: Duration,
    cancel: CancellationToken,
    mut scan: F,
) where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<ScanSummary, ScanError>>,
{
    loop {
        match scan(cancel.clone()).await {
            Ok(summary) if summary.range.is_some() => info!("[{}] Run complete: {}", name, summary),
            Ok(_) => {},
            Err(e) => error!("[{}] Run failed, retrying in {:?}: {}", name, poll_interval, e),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    info!("[{}] Follower stopped", name);
}

impl ScannerManager {
    pub fn new(settings: Arc<Settings>, db: Arc<Database>) -> Self {
        Self {
            running: Vec::new(),
            settings,
            db,
        }
    }

    async fn connect(&self, name: &str) -> Result<Arc<dyn ChainSource>> {
        let (client, head) = RpcClient::connect(&self.settings.rpc)
            .await
            .with_context(|| format!("Failed to connect RPC for scanner {}", name))?;
        info!("[{}] Connected to {} at block {}", name, client.current_endpoint(), head);
        Ok(Arc::new(client))
    }

    /// Start a scanner follower
    async fn start_scanner(&mut self, name: &'static str) -> Result<()> {
        if self.running.iter().any(|r| r.name == name) {
            warn!("Scanner {} is already running, skipping", name);
            return Ok(());
        }

        let chain = self.connect(name).await?;
        let cancel_token = CancellationToken::new();
        let poll_interval = Duration::from_secs(self.settings.scanner.poll_interval_secs);
        let settings = self.settings.clone();

        let handle = match name {
            TRADES_SCANNER => {
                let store: Arc<dyn TradeStore> = self.db.postgres.clone();
                tokio::spawn(follow(name, poll_interval, cancel_token.clone(), move |token| {
                    let chain = chain.clone();
                    let store = store.clone();
                    let settings = settings.clone();
                    async move { scan_trades(chain, store, &settings.scanner, None, &token).await }
                }))
            },
            DEPLOYMENTS_SCANNER => {
                let store: Arc<dyn DeploymentStore> = self.db.postgres.clone();
                tokio::spawn(follow(name, poll_interval, cancel_token.clone(), move |token| {
                    let chain = chain.clone();
                    let store = store.clone();
                    let settings = settings.clone();
                    async move {
                        scan_deployments(
                            chain,
                            store,
                            &settings.deployments,
                            &settings.scanner,
                            None,
                            &token,
                        )
                        .await
                    }
                }))
            },
            other => anyhow::bail!("Unknown scanner {}", other),
        };

        self.running.push(RunningScanner {
            name,
            handle,
            cancel_token,
        });

        info!("Scanner {} started", name);
        Ok(())
    }

    /// Stop a scanner gracefully
    async fn stop_scanner(running: RunningScanner) {
        info!("Stopping scanner {}", running.name);
        running.cancel_token.cancel();

        match tokio::time::timeout(STOP_TIMEOUT, running.handle).await {
            Ok(_) => info!("Scanner {} stopped gracefully", running.name),
            Err(_) => warn!(
                "Scanner {} did not stop within {:?}, continuing...",
                running.name, STOP_TIMEOUT
            ),
        }
    }

    /// Restart followers whose task ended (panic) and start missing ones
    async fn supervise(&mut self) {
        let (finished, alive): (Vec<_>, Vec<_>) =
            self.running.drain(..).partition(|r| r.handle.is_finished());
        self.running = alive;

        for stopped in finished {
            warn!("Scanner {} stopped unexpectedly, restarting", stopped.name);
        }

        for name in [DEPLOYMENTS_SCANNER, TRADES_SCANNER] {
            if !self.running.iter().any(|r| r.name == name) {
                if let Err(e) = self.start_scanner(name).await {
                    error!("Failed to start scanner {}: {:#}", name, e);
                }
            }
        }
    }

    /// Run the scanner manager main loop
    ///
    /// This will:
    /// 1. Start the deployment and trade followers
    /// 2. Periodically check that both are alive, restarting them if not
    /// 3. Stop all followers when the cancellation token is triggered
    pub async fn run(mut self, cancellation_token: CancellationToken) -> Result<()> {
        info!("ScannerManager: Starting scanners...");
        self.supervise().await;
        info!("ScannerManager: {} scanner(s) running", self.running.len());

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("ScannerManager: Received cancellation signal");
                    break;
                }
                _ = tokio::time::sleep(SUPERVISE_INTERVAL) => {
                    self.supervise().await;
                }
            }
        }

        info!("ScannerManager: Stopping all scanners...");
        for running in self.running.drain(..) {
            Self::stop_scanner(running).await;
        }

        info!("ScannerManager: Shutdown complete");
        Ok(())
    }
}
