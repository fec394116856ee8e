//! Per-wallet CSV table codec.

use std::io::Read;
use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::artifact::write_atomically;
use crate::error::{AppError, Result};
use crate::types::WalletRiskRecord;

pub const COL_WALLET: &str = "wallet";
pub const COL_RISK_SCORE: &str = "risk_score";
pub const COL_RISK_LEVEL: &str = "risk_level";
pub const COL_BOT_CLASSIFICATION: &str = "bot_classification";
pub const COL_WASH_FLAGS: &str = "wash_trading_flags";

/// Row layout written by the pipeline. The first five columns are the fixed
/// contract; the sub-signal columns are extras readers may ignore.
#[derive(Serialize)]
struct RecordRow<'a> {
    wallet: &'a str,
    risk_score: f64,
    risk_level: &'a str,
    bot_classification: &'a str,
    wash_trading_flags: String,
    wash_score: f64,
    bot_score: f64,
}

/// A table row as the viewer sees it. Optional columns that are absent read
/// as empty strings.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub wallet: String,
    /// NaN when the cell was not a number.
    pub risk_score: f64,
    pub risk_level: String,
    pub bot_classification: String,
    pub wash_trading_flags: String,
}

pub fn write_table(path: &Path, records: &[WalletRiskRecord]) -> Result<()> {
    write_atomically(path, |w| {
        let mut writer = csv::Writer::from_writer(w);
        for r in records {
            writer.serialize(RecordRow {
                wallet: &r.wallet,
                risk_score: r.risk_score,
                risk_level: r.risk_level.as_str(),
                bot_classification: &r.bot_classification,
                wash_trading_flags: r.flags_label(),
                wash_score: r.wash_score,
                bot_score: r.bot_score,
            })?;
        }
        if records.is_empty() {
            writer.write_record([
                COL_WALLET,
                COL_RISK_SCORE,
                COL_RISK_LEVEL,
                COL_BOT_CLASSIFICATION,
                COL_WASH_FLAGS,
                "wash_score",
                "bot_score",
            ])?;
        }
        writer.flush()?;
        Ok(())
    })
}

pub fn read_table(path: &Path) -> Result<Vec<TableRow>> {
    let file = std::fs::File::open(path)?;
    parse_table(file)
}

/// Parse a table by header name. A missing `risk_score` column is an error;
/// any other missing column reads as empty, extra columns are ignored, and
/// rows that fail to decode are skipped.
pub fn parse_table<R: Read>(reader: R) -> Result<Vec<TableRow>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let col = |name: &str| headers.iter().position(|h| h.trim() == name);

    let score_idx = col(COL_RISK_SCORE)
        .ok_or_else(|| AppError::Artifact(format!("table has no {COL_RISK_SCORE} column")))?;
    let wallet_idx = col(COL_WALLET);
    let level_idx = col(COL_RISK_LEVEL);
    let class_idx = col(COL_BOT_CLASSIFICATION);
    let flags_idx = col(COL_WASH_FLAGS);

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping unreadable table row {}: {e}", line + 2);
                continue;
            }
        };
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .unwrap_or("")
                .trim()
                .to_string()
        };
        rows.push(TableRow {
            wallet: cell(wallet_idx),
            risk_score: record
                .get(score_idx)
                .and_then(|s| s.trim().parse::<f64>().ok())
                .unwrap_or(f64::NAN),
            risk_level: cell(level_idx),
            bot_classification: cell(class_idx),
            wash_trading_flags: cell(flags_idx),
        });
    }
    Ok(rows)
}

/// The `n` highest-scored rows, highest first. Rows with an unknown score are
/// left out; equal scores keep their table order.
pub fn top_wallets(rows: &[TableRow], n: usize) -> Vec<&TableRow> {
    let mut ranked: Vec<&TableRow> = rows.iter().filter(|r| !r.risk_score.is_nan()).collect();
    ranked.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RiskLevel, WashFlag};
    use std::collections::BTreeSet;

    fn row(wallet: &str, score: f64) -> TableRow {
        TableRow {
            wallet: wallet.to_string(),
            risk_score: score,
            risk_level: RiskLevel::from_score(score).to_string(),
            bot_classification: String::new(),
            wash_trading_flags: String::new(),
        }
    }

    #[test]
    fn top_ten_is_stable_among_ties() {
        let scores = [99.0, 95.0, 95.0, 80.0, 70.0, 70.0, 60.0, 50.0, 40.0, 40.0, 40.0, 30.0, 20.0, 10.0, 5.0];
        let rows: Vec<TableRow> = scores
            .iter()
            .enumerate()
            .map(|(i, s)| row(&format!("w{i:02}"), *s))
            .collect();

        let top = top_wallets(&rows, 10);
        let wallets: Vec<&str> = top.iter().map(|r| r.wallet.as_str()).collect();
        assert_eq!(
            wallets,
            vec!["w00", "w01", "w02", "w03", "w04", "w05", "w06", "w07", "w08", "w09"]
        );
        // deterministic
        assert_eq!(top, top_wallets(&rows, 10));
    }

    #[test]
    fn ties_keep_table_order_when_unsorted() {
        let rows = vec![row("late", 50.0), row("first", 90.0), row("tie_a", 70.0), row("tie_b", 70.0)];
        let top: Vec<&str> = top_wallets(&rows, 3).iter().map(|r| r.wallet.as_str()).collect();
        assert_eq!(top, vec!["first", "tie_a", "tie_b"]);
    }

    #[test]
    fn non_numeric_score_is_unknown_and_excluded() {
        let csv = "wallet,risk_score,risk_level,bot_classification,wash_trading_flags\n\
                   0xa,88.5,CRITICAL,human,round_trip\n\
                   0xb,oops,LOW,human,\n\
                   0xc,12,LOW,human,\n";
        let rows = parse_table(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].risk_score.is_nan());

        let top: Vec<&str> = top_wallets(&rows, 10).iter().map(|r| r.wallet.as_str()).collect();
        assert_eq!(top, vec!["0xa", "0xc"]);
    }

    #[test]
    fn missing_score_column_is_an_error() {
        let csv = "wallet,risk_level\n0xa,LOW\n";
        assert!(matches!(parse_table(csv.as_bytes()), Err(AppError::Artifact(_))));
    }

    #[test]
    fn extra_and_missing_optional_columns_are_tolerated() {
        let csv = "notes,risk_score,wallet,extra\nhello,42,0xa,zzz\n";
        let rows = parse_table(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].wallet, "0xa");
        assert_eq!(rows[0].risk_score, 42.0);
        assert_eq!(rows[0].bot_classification, "");
    }

    #[test]
    fn written_table_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let records = vec![WalletRiskRecord {
            wallet: "0xa".to_string(),
            risk_score: 81.25,
            risk_level: RiskLevel::Critical,
            bot_classification: "periodic_bot".to_string(),
            wash_trading_flags: BTreeSet::from([WashFlag::RoundTrip, WashFlag::SelfTransfer]),
            wash_score: 75.0,
            bot_score: 75.0,
        }];
        write_table(&path, &records).unwrap();

        let rows = read_table(&path).unwrap();
        assert_eq!(
            rows,
            vec![TableRow {
                wallet: "0xa".to_string(),
                risk_score: 81.25,
                risk_level: "CRITICAL".to_string(),
                bot_classification: "periodic_bot".to_string(),
                wash_trading_flags: "self_transfer;round_trip".to_string(),
            }]
        );
    }

    #[test]
    fn empty_table_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        write_table(&path, &[]).unwrap();
        assert!(read_table(&path).unwrap().is_empty());
    }
}
