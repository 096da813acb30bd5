use serde::{Deserialize, Serialize};

/// Label attached to a wallet address by an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletLabel {
    pub address: String,
    pub label: String,
    pub label_type: Option<String>,
    pub risk_level: Option<String>,
    pub tags: Vec<String>,
}
