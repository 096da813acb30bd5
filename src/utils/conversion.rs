//! Type conversion and formatting utilities.
//!
//! Converts between alloy primitives and the representations stored in
//! PostgreSQL (lowercase hex strings, NUMERIC text, decimal-adjusted f64).

use alloy::primitives::{hex, Address, U256};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use once_cell::sync::Lazy;

// ============================================
// Hex Encoding
// ============================================

/// Encode bytes as a lowercase hex string with 0x prefix.
pub fn hex_encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Lowercase 0x-prefixed representation used for every stored address.
pub fn address_to_db(address: &Address) -> String {
    hex_encode(address.as_slice())
}

/// Normalize an address read from a database row or CSV cell.
///
/// Trims whitespace, lowercases, adds a missing `0x` prefix and accepts only
/// 40 hex digits. Returns `None` for anything else.
pub fn normalize_address(raw: &str) -> Option<Address> {
    let trimmed = raw.trim().to_lowercase();
    let prefixed = if trimmed.starts_with("0x") {
        trimmed
    } else {
        format!("0x{}", trimmed)
    };

    if prefixed.len() != 42 {
        return None;
    }

    prefixed.parse().ok()
}

// ============================================
// U256 Conversions
// ============================================

/// Convert U256 to f64 with decimal adjustment using BigDecimal for precision.
///
/// Returns 0.0 if the value cannot be represented.
///
/// # Example
/// ```ignore
/// let value = U256::from(1_000_000_000_000_000_000u128); // 1e18
/// let adjusted = u256_to_f64(value, 18); // Returns 1.0
/// ```
pub fn u256_to_f64(value: U256, decimals: u8) -> f64 {
    u256_to_f64_safe(value, decimals).unwrap_or(0.0)
}

/// Convert U256 to f64 with decimal adjustment, returning None if the
/// result is not a finite f64.
fn u256_to_f64_safe(value: U256, decimals: u8) -> Option<f64> {
    // Convert U256 to BigDecimal via bytes (faster than string parsing)
    let bytes: [u8; 32] = value.to_le_bytes();
    let big_int = BigInt::from_bytes_le(num_bigint::Sign::Plus, &bytes);
    let big_value = BigDecimal::from(big_int);

    let adjusted = big_value / big_pow10(decimals);

    let result = adjusted.to_f64()?;

    if result.is_finite() {
        Some(result)
    } else {
        None
    }
}

/// Decimal string of a U256, bound as TEXT and cast to NUMERIC in SQL.
pub fn u256_to_numeric(value: U256) -> String {
    value.to_string()
}

// ============================================
// Internal Helpers
// ============================================

static POW10_CACHE: Lazy<[BigDecimal; 25]> =
    Lazy::new(|| std::array::from_fn(|i| BigDecimal::from(BigInt::from(10u32).pow(i as u32))));

/// Compute 10^exp as BigDecimal.
pub(crate) fn big_pow10(exp: u8) -> BigDecimal {
    if (exp as usize) < POW10_CACHE.len() {
        POW10_CACHE[exp as usize].clone()
    } else {
        BigDecimal::from(BigInt::from(10u32).pow(exp as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn test_normalize_address_variants() {
        let expected = address!("0x6a000f20005980200259b80c5102003040001068");

        assert_eq!(
            normalize_address("0x6A000F20005980200259B80c5102003040001068"),
            Some(expected)
        );
        assert_eq!(
            normalize_address("  6a000f20005980200259b80c5102003040001068 "),
            Some(expected)
        );
        assert_eq!(normalize_address("0x6a000f2000598020"), None);
        assert_eq!(normalize_address(""), None);
        assert_eq!(
            normalize_address("0xzz000f20005980200259b80c5102003040001068"),
            None
        );
    }

    #[test]
    fn test_address_to_db_is_lowercase() {
        let addr = address!("0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7");
        assert_eq!(
            address_to_db(&addr),
            "0xb31f66aa3c1e785363f0875a1b74e27b85fd66c7"
        );
    }

    #[test]
    fn test_u256_to_f64_adjusts_decimals() {
        let one_token = U256::from(1_000_000_000_000_000_000u128);
        assert_eq!(u256_to_f64(one_token, 18), 1.0);
        assert_eq!(u256_to_f64(U256::from(1_500_000u64), 6), 1.5);
        assert_eq!(u256_to_f64(U256::ZERO, 18), 0.0);
    }

    #[test]
    fn test_u256_to_numeric_keeps_full_precision() {
        assert_eq!(
            u256_to_numeric(U256::MAX),
            "115792089237316195423570985008687907853269984665640564039457584007913129639935"
        );
    }
}
