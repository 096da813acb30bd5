//! Wallet label CSV import.
//!
//! Expected header: `address,label,label_type,risk_level,tags`. Only
//! `address` and `label` are required, columns may appear in any order and
//! tags are `;`-separated.

use std::{fs::File, io::Read, path::Path};

use anyhow::{bail, Context, Result};
use log::{info, warn};
use rustc_hash::FxHashMap;

use crate::{
    db::{models::WalletLabel, PostgresClient},
    utils::{address_to_db, normalize_address},
};

const TAG_SEPARATOR: char = ';';

/// A row that was not imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// 1-based line in the file, header included
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LabelImport {
    /// Valid labels, one per address
    pub labels: Vec<WalletLabel>,
    pub rejected: Vec<RejectedRow>,
    /// Rows replaced by a later row for the same address
    pub duplicates: usize,
}

struct Columns {
    address: usize,
    label: usize,
    label_type: Option<usize>,
    risk_level: Option<usize>,
    tags: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };

        let (Some(address), Some(label)) = (find("address"), find("label")) else {
            bail!("CSV header must contain 'address' and 'label' columns");
        };

        Ok(Self {
            address,
            label,
            label_type: find("label_type"),
            risk_level: find("risk_level"),
            tags: find("tags"),
        })
    }
}

fn optional(record: &csv::StringRecord, column: Option<usize>) -> Option<String> {
    column
        .and_then(|i| record.get(i))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_tags(raw: Option<String>) -> Vec<String> {
    raw.map(|tags| {
        tags.split(TAG_SEPARATOR)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_row(record: &csv::StringRecord, columns: &Columns) -> Result<WalletLabel, String> {
    let raw_address = record.get(columns.address).unwrap_or_default();
    let address = normalize_address(raw_address)
        .ok_or_else(|| format!("invalid address '{}'", raw_address))?;

    let label = record.get(columns.label).unwrap_or_default();
    if label.is_empty() {
        return Err("missing label".to_string());
    }

    Ok(WalletLabel {
        address: address_to_db(&address),
        label: label.to_string(),
        label_type: optional(record, columns.label_type),
        risk_level: optional(record, columns.risk_level),
        tags: parse_tags(optional(record, columns.tags)),
    })
}

/// Parse labels from CSV. Bad rows are collected, not fatal; only an
/// unreadable header fails the whole import.
pub fn parse_wallet_labels<R: Read>(reader: R) -> Result<LabelImport> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns = Columns::from_headers(reader.headers().context("Failed to read CSV header")?)?;

    let mut import = LabelImport::default();
    let mut by_address: FxHashMap<String, usize> = FxHashMap::default();
    let mut record = csv::StringRecord::new();
    // Header is line 1
    let mut line = 1u64;

    loop {
        match reader.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {
                line = record.position().map(|p| p.line()).unwrap_or(line + 1);
            },
            Err(e) => {
                line = e.position().map(|p| p.line()).unwrap_or(line + 1);
                import.rejected.push(RejectedRow {
                    line,
                    reason: e.to_string(),
                });
                continue;
            },
        }

        match parse_row(&record, &columns) {
            Ok(label) => match by_address.get(&label.address) {
                Some(&idx) => {
                    import.labels[idx] = label;
                    import.duplicates += 1;
                },
                None => {
                    by_address.insert(label.address.clone(), import.labels.len());
                    import.labels.push(label);
                },
            },
            Err(reason) => import.rejected.push(RejectedRow { line, reason }),
        }
    }

    Ok(import)
}

/// Import a label file into `arena.wallet_labels`.
pub async fn import_wallet_labels(postgres: &PostgresClient, path: &Path) -> Result<LabelImport> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let import = parse_wallet_labels(file)?;

    for row in &import.rejected {
        warn!("Rejected line {}: {}", row.line, row.reason);
    }

    let written = postgres.upsert_wallet_labels(&import.labels).await?;

    info!(
        "Imported {} wallet labels from {} ({} rows written, {} rejected, {} duplicates)",
        import.labels.len(),
        path.display(),
        written,
        import.rejected.len(),
        import.duplicates
    );

    Ok(import)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_rows() {
        let csv = "address,label,label_type,risk_level,tags\n\
                   0x6A000F20005980200259B80c5102003040001068,Router,contract,low,dex;aggregator\n\
                   0x2000000000000000000000000000000000000002,Sniper,bot,high,\n";

        let import = parse_wallet_labels(csv.as_bytes()).unwrap();

        assert!(import.rejected.is_empty());
        assert_eq!(import.labels.len(), 2);
        assert_eq!(
            import.labels[0].address,
            "0x6a000f20005980200259b80c5102003040001068"
        );
        assert_eq!(import.labels[0].tags, vec!["dex", "aggregator"]);
        assert_eq!(import.labels[1].risk_level.as_deref(), Some("high"));
        assert!(import.labels[1].tags.is_empty());
    }

    #[test]
    fn test_invalid_rows_report_line_numbers() {
        let csv = "address,label\n\
                   not-an-address,Bad\n\
                   0x2000000000000000000000000000000000000002,\n\
                   0x3000000000000000000000000000000000000003,Good\n";

        let import = parse_wallet_labels(csv.as_bytes()).unwrap();

        assert_eq!(import.labels.len(), 1);
        assert_eq!(import.labels[0].label, "Good");
        assert_eq!(import.labels[0].label_type, None);
        assert_eq!(
            import.rejected.iter().map(|r| r.line).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert!(import.rejected[0].reason.contains("invalid address"));
        assert_eq!(import.rejected[1].reason, "missing label");
    }

    #[test]
    fn test_last_duplicate_wins() {
        let csv = "label,address\n\
                   First,0x2000000000000000000000000000000000000002\n\
                   Other,0x3000000000000000000000000000000000000003\n\
                   Second,0x2000000000000000000000000000000000000002\n";

        let import = parse_wallet_labels(csv.as_bytes()).unwrap();

        assert_eq!(import.labels.len(), 2);
        assert_eq!(import.duplicates, 1);
        assert_eq!(import.labels[0].label, "Second");
    }

    #[test]
    fn test_header_without_label_column_fails() {
        let csv = "address,name\n0x2000000000000000000000000000000000000002,x\n";
        assert!(parse_wallet_labels(csv.as_bytes()).is_err());
    }
}
