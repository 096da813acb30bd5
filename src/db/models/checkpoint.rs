use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scanner progress checkpoint (PostgreSQL).
///
/// One row per named scanner. `last_block` is the last block whose logs were
/// fully written; a resumed scan starts at `last_block + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCheckpoint {
    pub scanner: String,
    pub last_block: u64,
    pub updated_at: DateTime<Utc>,
}

