use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::artifact::naming::{ArtifactKind, ArtifactName};
use crate::artifact::report::{read_report, write_report};
use crate::artifact::table::{read_table, write_table, TableRow};
use crate::error::Result;
use crate::types::{RunTimestamp, Token, TokenRiskSummary, WalletRiskRecord};

pub const MISSING_REPORT_WARNING: &str = "Text report file missing for this selection.";
pub const MISSING_TABLE_WARNING: &str = "CSV analysis file missing for this selection.";

/// The files found for one (token, run). Either side may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactPair {
    pub report: Option<PathBuf>,
    pub table: Option<PathBuf>,
}

/// token label → run → files.
pub type ArtifactIndex = BTreeMap<String, BTreeMap<RunTimestamp, ArtifactPair>>;

/// Everything the viewer needs for one selection. Absent or unreadable
/// artifacts leave their field empty and add a warning.
#[derive(Debug, Clone, Default)]
pub struct LoadedRun {
    pub summary: Option<TokenRiskSummary>,
    pub rows: Option<Vec<TableRow>>,
    pub warnings: Vec<String>,
}

/// Flat output directory holding report/table pairs.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, token_label: &str, timestamp: RunTimestamp, kind: ArtifactKind) -> PathBuf {
        self.dir
            .join(ArtifactName::new(token_label, timestamp, kind).file_name())
    }

    /// Write both artifacts for a run. Each file is written atomically.
    pub fn write_run(
        &self,
        token: &Token,
        timestamp: RunTimestamp,
        summary: &TokenRiskSummary,
        records: &[WalletRiskRecord],
    ) -> Result<ArtifactPair> {
        fs::create_dir_all(&self.dir)?;
        let label = token.label();

        let report = self.path_for(&label, timestamp, ArtifactKind::Report);
        write_report(&report, token, timestamp, summary, records)?;

        let table = self.path_for(&label, timestamp, ArtifactKind::Analysis);
        write_table(&table, records)?;

        info!(
            token = %token,
            run = %timestamp,
            wallets = records.len(),
            "Artifacts written to {}",
            self.dir.display()
        );
        Ok(ArtifactPair {
            report: Some(report),
            table: Some(table),
        })
    }

    /// Scan the directory. A missing directory is an empty index; entries that
    /// are not files or do not follow the naming scheme are skipped.
    pub fn discover(&self) -> Result<ArtifactIndex> {
        let mut index = ArtifactIndex::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(index),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(ArtifactName::parse) else {
                debug!("Ignoring {:?}", file_name);
                continue;
            };
            let pair = index
                .entry(name.token)
                .or_default()
                .entry(name.timestamp)
                .or_default();
            match name.kind {
                ArtifactKind::Report => pair.report = Some(entry.path()),
                ArtifactKind::Analysis => pair.table = Some(entry.path()),
            }
        }
        Ok(index)
    }

    /// Load the artifacts for one selection, re-reading them from disk.
    pub fn load(&self, token_label: &str, timestamp: RunTimestamp) -> LoadedRun {
        let mut run = LoadedRun::default();

        let report = self.path_for(token_label, timestamp, ArtifactKind::Report);
        if report.is_file() {
            match read_report(&report) {
                Ok(summary) => run.summary = Some(summary),
                Err(e) => {
                    warn!("Failed to read {}: {e}", report.display());
                    run.warnings.push(format!("Text report could not be read: {e}"));
                }
            }
        } else {
            run.warnings.push(MISSING_REPORT_WARNING.to_string());
        }

        let table = self.path_for(token_label, timestamp, ArtifactKind::Analysis);
        if table.is_file() {
            match read_table(&table) {
                Ok(rows) => run.rows = Some(rows),
                Err(e) => {
                    warn!("Failed to read {}: {e}", table.display());
                    run.warnings.push(format!("CSV analysis file could not be read: {e}"));
                }
            }
        } else {
            run.warnings.push(MISSING_TABLE_WARNING.to_string());
        }

        run
    }
}

/// First token in sorted order, paired with its newest run.
pub fn default_selection(index: &ArtifactIndex) -> Option<(String, RunTimestamp)> {
    let (token, runs) = index.iter().next()?;
    let (ts, _) = runs.iter().next_back()?;
    Some((token.clone(), *ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RiskDistribution, RiskLevel};
    use std::collections::BTreeSet;

    fn ts(s: &str) -> RunTimestamp {
        s.parse().unwrap()
    }

    fn summary() -> TokenRiskSummary {
        TokenRiskSummary {
            global_health_score: 58.0,
            global_risk_score: 42.0,
            concentration_risk: 30.0,
            bot_risk: 50.0,
            wash_trading_risk: 44.0,
            distribution: RiskDistribution { critical: 0, high: 1, medium: 0, low: 0 },
        }
    }

    fn records() -> Vec<WalletRiskRecord> {
        vec![WalletRiskRecord {
            wallet: "0xa".to_string(),
            risk_score: 60.0,
            risk_level: RiskLevel::High,
            bot_classification: "burst_trader".to_string(),
            wash_trading_flags: BTreeSet::new(),
            wash_score: 60.0,
            bot_score: 60.0,
        }]
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("not_there"));
        assert!(store.discover().unwrap().is_empty());
    }

    #[test]
    fn discovery_groups_pairs_and_ignores_noise() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let token = Token::new("ABC", "ethereum");
        store.write_run(&token, ts("20240101_120000"), &summary(), &records()).unwrap();
        store.write_run(&token, ts("20240102_120000"), &summary(), &records()).unwrap();
        fs::write(dir.path().join("XYZ_risk_analysis_20240105_000000.csv"), "wallet,risk_score\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        fs::write(dir.path().join("ABC_risk_report_20240103_000000.txt.tmp"), "partial").unwrap();
        fs::create_dir(dir.path().join("ABC_risk_report_20240104_000000.txt")).unwrap();

        let index = store.discover().unwrap();
        assert_eq!(index.keys().collect::<Vec<_>>(), vec!["ABC", "XYZ"]);
        assert_eq!(index["ABC"].len(), 2);
        let pair = &index["ABC"][&ts("20240102_120000")];
        assert!(pair.report.is_some() && pair.table.is_some());
        let lone = &index["XYZ"][&ts("20240105_000000")];
        assert!(lone.report.is_none() && lone.table.is_some());

        // no writes in between, same answer
        assert_eq!(store.discover().unwrap(), index);
    }

    #[test]
    fn default_selection_is_first_token_newest_run() {
        let mut index = ArtifactIndex::new();
        for (token, run) in [("B", "20240301_000000"), ("A", "20240101_000000"), ("A", "20240201_000000")] {
            index.entry(token.to_string()).or_default().insert(ts(run), ArtifactPair::default());
        }
        assert_eq!(default_selection(&index), Some(("A".to_string(), ts("20240201_000000"))));
        assert_eq!(default_selection(&ArtifactIndex::new()), None);
    }

    #[test]
    fn load_reads_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let token = Token::new("ABC", "ethereum");
        let run = ts("20240101_120000");
        store.write_run(&token, run, &summary(), &records()).unwrap();

        let loaded = store.load("ABC", run);
        assert!(loaded.warnings.is_empty());
        assert_eq!(loaded.summary, Some(summary()));
        assert_eq!(loaded.rows.unwrap()[0].wallet, "0xa");
    }

    #[test]
    fn load_warns_about_missing_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let run = ts("20240105_000000");
        fs::write(
            store.path_for("XYZ", run, ArtifactKind::Analysis),
            "wallet,risk_score\n0x1,12\n",
        )
        .unwrap();

        let loaded = store.load("XYZ", run);
        assert!(loaded.summary.is_none());
        assert_eq!(loaded.rows.as_ref().map(Vec::len), Some(1));
        assert_eq!(loaded.warnings, vec![MISSING_REPORT_WARNING.to_string()]);
    }

    #[test]
    fn load_warns_about_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let run = ts("20240105_000000");
        fs::write(store.path_for("XYZ", run, ArtifactKind::Report), "").unwrap();

        let loaded = store.load("XYZ", run);
        assert_eq!(loaded.summary, Some(TokenRiskSummary::default()));
        assert!(loaded.rows.is_none());
        assert_eq!(loaded.warnings, vec![MISSING_TABLE_WARNING.to_string()]);
    }
}
