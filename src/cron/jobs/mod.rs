pub mod bonding_status;
pub mod trade_stats;
