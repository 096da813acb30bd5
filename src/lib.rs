pub mod abis;
pub mod config;
pub mod cron;
pub mod db;
pub mod error;
pub mod importer;
pub mod rpc;
pub mod utils;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::Settings;
pub use cron::{CronScheduler, CronSettings};
pub use db::Database;
pub use error::{RpcError, ScanError};
pub use rpc::{ChainSource, RpcClient};
pub use worker::ScannerManager;
