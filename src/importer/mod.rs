//! Offline data imports.

pub mod wallet_labels;

pub use wallet_labels::{import_wallet_labels, parse_wallet_labels, LabelImport, RejectedRow};
