use alloy::primitives::Address;
use log::warn;
use rustc_hash::FxHashMap;

use crate::{db::models::TargetTokenRow, utils::normalize_address};

const DEFAULT_DECIMALS: u8 = 18;

/// Tokens whose router transfers are recorded, with their decimals.
#[derive(Debug, Clone, Default)]
pub struct TargetTokens {
    decimals: FxHashMap<Address, u8>,
}

impl TargetTokens {
    /// Build the set from deployment rows. Malformed addresses are dropped
    /// and missing or out-of-range decimals default to 18.
    pub fn from_rows(rows: Vec<TargetTokenRow>) -> Self {
        let mut decimals = FxHashMap::default();
        decimals.reserve(rows.len());
        let mut rejected = 0usize;

        for row in rows {
            let Some(address) = normalize_address(&row.token_address) else {
                rejected += 1;
                continue;
            };

            let token_decimals = row
                .decimals
                .and_then(|d| u8::try_from(d).ok())
                .unwrap_or(DEFAULT_DECIMALS);

            decimals.insert(address, token_decimals);
        }

        if rejected > 0 {
            warn!("Ignored {} deployment rows with malformed token addresses", rejected);
        }

        Self { decimals }
    }

    pub fn contains(&self, token: &Address) -> bool {
        self.decimals.contains_key(token)
    }

    pub fn decimals(&self, token: &Address) -> Option<u8> {
        self.decimals.get(token).copied()
    }

    pub fn len(&self) -> usize {
        self.decimals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decimals.is_empty()
    }
}

impl FromIterator<(Address, u8)> for TargetTokens {
    fn from_iter<I: IntoIterator<Item = (Address, u8)>>(iter: I) -> Self {
        Self {
            decimals: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn row(token_address: &str, decimals: Option<i16>) -> TargetTokenRow {
        TargetTokenRow {
            token_address: token_address.to_string(),
            decimals,
        }
    }

    #[test]
    fn test_rows_are_normalized() {
        let targets = TargetTokens::from_rows(vec![
            row("  0xAbCdEf0000000000000000000000000000000001 ", Some(6)),
            row("abcdef0000000000000000000000000000000002", None),
            row("0x1234", Some(18)),
            row("0xzzzzzz0000000000000000000000000000000003", Some(18)),
            row("0xabcdef0000000000000000000000000000000004", Some(-1)),
        ]);

        assert_eq!(targets.len(), 3);
        assert_eq!(
            targets.decimals(&address!("0xabcdef0000000000000000000000000000000001")),
            Some(6)
        );
        assert_eq!(
            targets.decimals(&address!("0xabcdef0000000000000000000000000000000002")),
            Some(18)
        );
        assert_eq!(
            targets.decimals(&address!("0xabcdef0000000000000000000000000000000004")),
            Some(18)
        );
    }

    #[test]
    fn test_empty_rows_give_empty_set() {
        assert!(TargetTokens::from_rows(Vec::new()).is_empty());
    }
}
