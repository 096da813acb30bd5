use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Arena token deployment, created from a `TokenCreated` event.
///
/// Addresses and hashes are lowercase hex. Bonding fields and router
/// counters are owned by the bonding tracker and the stats job, so they are
/// not part of the insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenDeployment {
    pub token_address: String,
    pub token_id: U256,
    pub creator: String,
    pub deployer_wallet: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub deployed_at: DateTime<Utc>,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
    /// Native value sent with the deploy transaction, in AVAX
    pub deployment_value: f64,
}

/// Deployed token as loaded for trade filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTokenRow {
    pub token_address: String,
    pub decimals: Option<i16>,
}

/// Unbonded deployment eligible for a `getPair` lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondingCandidate {
    pub token_address: String,
    pub block_number: u64,
}

/// Detected migration of a token to its DEX pair.
#[derive(Debug, Clone, PartialEq)]
pub struct BondingUpdate {
    pub token_address: String,
    pub pair_address: String,
    pub bonded_at: Option<DateTime<Utc>>,
    pub bonded_block: Option<u64>,
    /// Set when the pair exists but its creation could not be located
    pub bonding_error: Option<String>,
}
