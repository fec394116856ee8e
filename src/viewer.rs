//! State behind the `risk-viewer` terminal UI. Holds only the directory index
//! and the current selection; artifact contents are re-read on every change.

use std::path::{Path, PathBuf};

use crate::artifact::{default_selection, top_wallets, ArtifactIndex, ArtifactPair, ArtifactStore, LoadedRun, TableRow};
use crate::config::VIEWER_TOP_WALLETS;
use crate::types::{RiskDistribution, RiskLevel, RunTimestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub token: String,
    pub timestamp: RunTimestamp,
}

#[derive(Debug)]
pub struct ViewerState {
    store: ArtifactStore,
    index: ArtifactIndex,
    pub selection: Option<Selection>,
    pub loaded: LoadedRun,
    /// Set when the directory scan itself failed.
    pub scan_error: Option<String>,
}

impl ViewerState {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let mut state = Self {
            store: ArtifactStore::new(dir),
            index: ArtifactIndex::new(),
            selection: None,
            loaded: LoadedRun::default(),
            scan_error: None,
        };
        state.rescan();
        state
    }

    pub fn dir(&self) -> &Path {
        self.store.dir()
    }

    /// Re-read the directory. Keeps the current selection when it still
    /// exists, otherwise falls back to the default one.
    pub fn rescan(&mut self) {
        match self.store.discover() {
            Ok(index) => {
                self.index = index;
                self.scan_error = None;
            }
            Err(e) => {
                self.index = ArtifactIndex::new();
                self.scan_error = Some(format!("Could not scan {}: {e}", self.dir().display()));
            }
        }

        let still_there = self
            .selection
            .as_ref()
            .is_some_and(|s| self.runs_of(&s.token).contains(&s.timestamp));
        if !still_there {
            self.selection = default_selection(&self.index).map(|(token, timestamp)| Selection { token, timestamp });
        }
        self.reload();
    }

    /// Token labels, ascending.
    pub fn tokens(&self) -> Vec<&str> {
        self.index.keys().map(String::as_str).collect()
    }

    /// Runs of the selected token, newest first.
    pub fn runs(&self) -> Vec<RunTimestamp> {
        self.selection
            .as_ref()
            .map(|s| self.runs_of(&s.token))
            .unwrap_or_default()
    }

    fn runs_of(&self, token: &str) -> Vec<RunTimestamp> {
        self.index
            .get(token)
            .map(|runs| runs.keys().rev().copied().collect())
            .unwrap_or_default()
    }

    /// Files found for the current selection.
    pub fn files(&self) -> Option<&ArtifactPair> {
        let s = self.selection.as_ref()?;
        self.index.get(&s.token)?.get(&s.timestamp)
    }

    pub fn next_token(&mut self) {
        self.step_token(1);
    }

    pub fn prev_token(&mut self) {
        self.step_token(-1);
    }

    /// Towards older runs.
    pub fn next_run(&mut self) {
        self.step_run(1);
    }

    /// Towards newer runs.
    pub fn prev_run(&mut self) {
        self.step_run(-1);
    }

    fn step_token(&mut self, delta: isize) {
        let Some(current) = self.selection.as_ref() else { return };
        let tokens = self.tokens();
        let Some(pos) = tokens.iter().position(|t| *t == current.token) else { return };
        let Some(next) = step(pos, delta, tokens.len()) else { return };
        let token = tokens[next].to_string();
        // newest run of the new token
        let Some(timestamp) = self.runs_of(&token).first().copied() else { return };
        self.selection = Some(Selection { token, timestamp });
        self.reload();
    }

    fn step_run(&mut self, delta: isize) {
        let Some(current) = self.selection.as_ref() else { return };
        let runs = self.runs();
        let Some(pos) = runs.iter().position(|t| *t == current.timestamp) else { return };
        let Some(next) = step(pos, delta, runs.len()) else { return };
        let token = current.token.clone();
        self.selection = Some(Selection {
            token,
            timestamp: runs[next],
        });
        self.reload();
    }

    fn reload(&mut self) {
        self.loaded = match &self.selection {
            Some(s) => self.store.load(&s.token, s.timestamp),
            None => LoadedRun::default(),
        };
    }

    /// Highest-risk rows of the loaded table.
    pub fn top_wallets(&self) -> Vec<&TableRow> {
        self.loaded
            .rows
            .as_deref()
            .map(|rows| top_wallets(rows, VIEWER_TOP_WALLETS))
            .unwrap_or_default()
    }
}

fn step(pos: usize, delta: isize, len: usize) -> Option<usize> {
    let next = pos.checked_add_signed(delta)?;
    (next < len).then_some(next)
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn format_score(v: f64) -> String {
    if v.is_nan() {
        "—".to_string()
    } else {
        format!("{v:.2}")
    }
}

/// One `LEVEL : n wallets (p%)` line per tier, empty tiers included.
pub fn distribution_lines(dist: &RiskDistribution) -> Vec<String> {
    let total = dist.total();
    RiskLevel::ALL
        .iter()
        .map(|level| {
            let count = dist.count(*level);
            let pct = if total > 0 { count as f64 / total as f64 * 100.0 } else { 0.0 };
            format!("{level} : {count} wallets ({pct:.1}%)")
        })
        .collect()
}

pub fn format_timestamp(ts: RunTimestamp) -> String {
    ts.datetime().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
