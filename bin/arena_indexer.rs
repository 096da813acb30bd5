use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use jemallocator::Jemalloc;
use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use arena_indexer::{
    db::{BondingStore, DeploymentStore, TradeStore},
    importer::import_wallet_labels,
    worker::{backfill_trades, scan_deployments, scan_trades, BondingTracker, ScanOptions},
    ChainSource, CronScheduler, CronSettings, Database, RpcClient, ScannerManager, Settings,
};

#[derive(Parser)]
#[command(
    name = "arena-indexer",
    version,
    about = "Arena token launch and router trade indexer for Avalanche C-Chain"
)]
struct Cli {
    /// Config file path, without extension
    #[arg(long, global = true, default_value = "config")]
    config: String,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow the chain: deployment and trade scanners plus periodic jobs
    Run,
    /// Incremental router trade scan up to head
    ScanTrades {
        #[arg(long)]
        to_block: Option<u64>,
    },
    /// Incremental deployment scan up to head
    ScanDeployments {
        #[arg(long)]
        to_block: Option<u64>,
    },
    /// Scan an explicit block range for trades without touching the checkpoint
    Backfill {
        #[arg(long)]
        from: u64,
        #[arg(long)]
        to: u64,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Detect tokens that migrated to a DEX pair
    Bonding {
        #[arg(long)]
        blocks_back: Option<u64>,
        #[arg(long)]
        hours_back: Option<i64>,
    },
    /// Import wallet labels from CSV
    ImportLabels { csv: PathBuf },
    /// Checkpoints and table counts
    Status {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    SimpleLogger::new()
        .with_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .with_module_level("tokio_postgres", LevelFilter::Warn)
        .init()
        .context("Failed to initialize logger")?;

    let settings = Arc::new(
        Settings::from_path(&cli.config).with_context(|| {
            format!(
                "Failed to load config '{}'. Please ensure it exists and is valid",
                cli.config
            )
        })?,
    );

    let db = Arc::new(
        Database::new(&settings.postgres)
            .await
            .context("Failed to initialize database connection")?,
    );

    let cancellation_token = CancellationToken::new();

    match cli.command {
        Command::Run => run_indexer(settings, db, cancellation_token).await,
        Command::ScanTrades { to_block } => {
            spawn_shutdown_listener(cancellation_token.clone());
            let chain = connect(&settings).await?;
            let store: Arc<dyn TradeStore> = db.postgres.clone();
            let summary =
                scan_trades(chain, store, &settings.scanner, to_block, &cancellation_token)
                    .await?;
            info!("Trade scan: {}", summary);
            Ok(())
        },
        Command::ScanDeployments { to_block } => {
            spawn_shutdown_listener(cancellation_token.clone());
            let chain = connect(&settings).await?;
            let store: Arc<dyn DeploymentStore> = db.postgres.clone();
            let summary = scan_deployments(
                chain,
                store,
                &settings.deployments,
                &settings.scanner,
                to_block,
                &cancellation_token,
            )
            .await?;
            info!("Deployment scan: {}", summary);
            Ok(())
        },
        Command::Backfill { from, to, workers } => {
            spawn_shutdown_listener(cancellation_token.clone());
            let workers = workers.unwrap_or(settings.scanner.backfill_workers).max(1);
            let rpc = settings.rpc.clone();
            let store: Arc<dyn TradeStore> = db.postgres.clone();

            let report = backfill_trades(
                |worker| {
                    let client = RpcClient::new(&rpc)?.with_preferred_endpoint(worker);
                    Ok(Arc::new(client) as Arc<dyn ChainSource>)
                },
                store,
                settings.scanner.routers.clone(),
                from,
                to,
                workers,
                &ScanOptions::for_trades(&settings.scanner),
                &cancellation_token,
            )
            .await?;

            for failed in &report.failed {
                if let Err(e) = &failed.result {
                    error!("Worker {} failed on {}: {}", failed.worker, failed.range, e);
                }
            }
            if !report.is_complete() {
                anyhow::bail!("Backfill incomplete, rerun the failed ranges");
            }
            Ok(())
        },
        Command::Bonding {
            blocks_back,
            hours_back,
        } => {
            spawn_shutdown_listener(cancellation_token.clone());
            let chain = connect(&settings).await?;
            let store: Arc<dyn BondingStore> = db.postgres.clone();
            BondingTracker::new(chain, store, &settings.bonding)
                .with_window(blocks_back, hours_back)
                .run(&cancellation_token)
                .await?;
            Ok(())
        },
        Command::ImportLabels { csv } => {
            let import = import_wallet_labels(&db.postgres, &csv).await?;
            if !import.rejected.is_empty() {
                warn!("{} rows rejected", import.rejected.len());
            }
            Ok(())
        },
        Command::Status { json } => {
            let status = db.postgres.get_status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                for checkpoint in &status.checkpoints {
                    println!(
                        "{:<20} block {:>10} (updated {})",
                        checkpoint.scanner, checkpoint.last_block, checkpoint.updated_at
                    );
                }
                println!("deployments:      {}", status.deployments);
                println!("bonded:           {}", status.bonded);
                println!("deployer wallets: {}", status.deployer_wallets);
                println!("router trades:    {}", status.router_trades);
                println!("wallet labels:    {}", status.wallet_labels);
            }
            Ok(())
        },
    }
}

async fn connect(settings: &Settings) -> anyhow::Result<Arc<dyn ChainSource>> {
    let (client, head) = RpcClient::connect(&settings.rpc)
        .await
        .context("Failed to connect to any RPC endpoint")?;
    info!("Connected to {} at block {}", client.current_endpoint(), head);
    Ok(Arc::new(client))
}

/// Resolves on Ctrl+C or SIGTERM.
async fn wait_for_shutdown() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm_stream =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
    }

    Ok(())
}

fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown().await {
            error!("Shutdown listener failed: {:#}", e);
            return;
        }
        token.cancel();
    });
}

async fn run_indexer(
    settings: Arc<Settings>,
    db: Arc<Database>,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    let scanner_manager = ScannerManager::new(settings.clone(), db.clone());

    let manager_token = cancellation_token.child_token();
    let manager_handle = tokio::spawn(async move {
        if let Err(e) = scanner_manager.run(manager_token).await {
            error!("Scanner manager failed: {:#}", e);
        }
    });

    info!("Scanner manager started");

    // Jobs get their own client so scanner backoff does not stall them
    let cron_chain = connect(&settings).await?;
    let cron_scheduler = CronScheduler::new(
        db.clone(),
        cron_chain,
        settings.bonding.clone(),
        CronSettings::from(settings.as_ref()),
    );

    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    info!("Cron scheduler started - bonding and trade stats will run periodically");
    info!("Indexer running. Press Ctrl+C to stop.");

    wait_for_shutdown().await?;

    info!("Finishing all tasks...");
    cancellation_token.cancel();

    info!("Waiting for scanner manager to stop...");
    let _ = manager_handle.await;

    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    info!("Shutdown complete");
    Ok(())
}
