//! Error taxonomy for chain access and scanning.
//!
//! Storage and application code use `anyhow`; these types exist where callers
//! need to decide between retrying, skipping, and aborting.

use std::time::Duration;

use alloy::primitives::B256;
use thiserror::Error;

/// Failure of a single JSON-RPC request or of the whole retry sequence.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("node returned error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("{op} failed after {attempts} attempts: {last}")]
    Exhausted {
        op: &'static str,
        attempts: u32,
        last: Box<RpcError>,
    },

    #[error("no RPC endpoint configured")]
    NoEndpoints,

    #[error("none of the {0} configured RPC endpoints answered")]
    NoHealthyEndpoint(usize),

    #[error("invalid RPC endpoint URL {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
}

impl RpcError {
    /// Whether another attempt (possibly on another endpoint) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RpcError::Transport(_) | RpcError::Node { .. } | RpcError::Timeout(_)
        )
    }

    pub(crate) fn from_transport(err: alloy::transports::TransportError) -> Self {
        match err {
            alloy::transports::RpcError::ErrorResp(payload) => RpcError::Node {
                code: payload.code,
                message: payload.message.to_string(),
            },
            alloy::transports::RpcError::DeserError { err, .. } => {
                RpcError::Decode(err.to_string())
            },
            other => RpcError::Transport(other.to_string()),
        }
    }

    pub(crate) fn from_contract(err: alloy::contract::Error) -> Self {
        match err {
            alloy::contract::Error::TransportError(e) => Self::from_transport(e),
            other => RpcError::Decode(other.to_string()),
        }
    }
}

/// Failure of a scan run. The checkpoint has already been flushed up to the
/// last completed chunk when one of these is returned.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("storage error: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error("transaction {0} referenced by a log was not returned by the node")]
    MissingTransaction(B256),

    #[error("block {0} was not returned by the node")]
    MissingBlock(u64),

    #[error("invalid block range {from}..={to}")]
    InvalidRange { from: u64, to: u64 },
}
