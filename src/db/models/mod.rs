mod checkpoint;
mod deployment;
mod status;
mod trade;
mod wallet_label;

pub use checkpoint::ScanCheckpoint;
pub use deployment::{BondingCandidate, BondingUpdate, TargetTokenRow, TokenDeployment};
pub use status::IndexerStatus;
pub use trade::{RouterTrade, TradeSide};
pub use wallet_label::WalletLabel;
