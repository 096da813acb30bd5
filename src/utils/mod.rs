//! Utility functions for the Arena indexer.
//!
//! - [`conversion`] - Address normalization and U256 conversions
//! - [`ranges`] - Block range chunking and partitioning

mod conversion;
mod ranges;

// ============================================
// Re-exports
// ============================================

pub use conversion::{address_to_db, hex_encode, normalize_address, u256_to_f64, u256_to_numeric};

pub use ranges::{block_chunks, partition_range, BlockRange};
