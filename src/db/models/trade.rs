use alloy::primitives::U256;
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a router trade from the user's point of view.
///
/// Maps to the `arena.trade_side` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "trade_side")]
pub enum TradeSide {
    /// Router sends the token out to the user
    #[postgres(name = "BUY")]
    #[serde(rename = "BUY")]
    Buy,
    /// Router receives the token from the user
    #[postgres(name = "SELL")]
    #[serde(rename = "SELL")]
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One router leg of a target-token transfer.
///
/// Unique on `(tx_hash, log_index)`; immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouterTrade {
    pub tx_hash: String,
    pub log_index: u64,
    pub block_number: u64,
    pub token_address: String,
    /// Sender of the transaction that produced the transfer
    pub real_user: String,
    /// Non-router side of the transfer
    pub counterparty: String,
    pub from_address: String,
    pub to_address: String,
    pub router_address: String,
    pub amount: U256,
    pub amount_adjusted: f64,
    pub side: TradeSide,
}
