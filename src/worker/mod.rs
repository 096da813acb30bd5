pub mod backfill;
pub mod bonding;
pub mod deployments;
pub mod manager;
pub mod parser;
pub mod scanner;
pub mod targets;
pub mod trades;

pub use backfill::{backfill_trades, BackfillReport};
pub use bonding::{BondingReport, BondingTracker};
pub use deployments::{scan_deployments, DEPLOYMENTS_SCANNER};
pub use manager::ScannerManager;
pub use scanner::{ScanOptions, ScanSummary};
pub use targets::TargetTokens;
pub use trades::{scan_trades, TRADES_SCANNER};
