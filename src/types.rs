use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use chrono::{NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub address: String,
    pub chain: String,
}

impl Token {
    pub fn new(address: impl Into<String>, chain: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            chain: chain.into(),
        }
    }

    /// Label used in artifact filenames. Path separators would split the name
    /// across directories, so they are replaced.
    pub fn label(&self) -> String {
        self.address.replace(['/', '\\'], "-")
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.chain, self.address)
    }
}

// ---------------------------------------------------------------------------
// Run timestamp
// ---------------------------------------------------------------------------

pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Second-resolution UTC timestamp identifying one analysis run.
/// Orders chronologically, which matches the lexical order of its text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunTimestamp(NaiveDateTime);

impl RunTimestamp {
    pub fn now() -> Self {
        let now = Utc::now().naive_utc();
        Self(now.with_nanosecond(0).unwrap_or(now))
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }
}

impl std::fmt::Display for RunTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(RUN_TIMESTAMP_FORMAT))
    }
}

impl FromStr for RunTimestamp {
    type Err = AppError;

    /// Accepts exactly `YYYYMMDD_HHMMSS`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = s.as_bytes();
        let shaped = b.len() == 15
            && b[8] == b'_'
            && b[..8].iter().all(u8::is_ascii_digit)
            && b[9..].iter().all(u8::is_ascii_digit);
        if !shaped {
            return Err(AppError::Artifact(format!("not a run timestamp: {s:?}")));
        }
        NaiveDateTime::parse_from_str(s, RUN_TIMESTAMP_FORMAT)
            .map(Self)
            .map_err(|e| AppError::Artifact(format!("invalid run timestamp {s:?}: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Time window
// ---------------------------------------------------------------------------

/// Lookback window for transfer flows, written as `<n>m`, `<n>h` or `<n>d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    secs: u64,
}

impl TimeWindow {
    pub fn secs(&self) -> u64 {
        self.secs
    }

    pub fn hours(&self) -> f64 {
        self.secs as f64 / 3600.0
    }

    /// Arkham `timeLast` query value.
    pub fn as_query(&self) -> String {
        if self.secs % 86_400 == 0 {
            format!("{}d", self.secs / 86_400)
        } else if self.secs % 3600 == 0 {
            format!("{}h", self.secs / 3600)
        } else {
            format!("{}m", self.secs / 60)
        }
    }
}

impl FromStr for TimeWindow {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || AppError::Config(format!("TIME_WINDOW must look like 30m, 24h or 7d, got {s:?}"));
        let Some(unit) = s.chars().last() else {
            return Err(invalid());
        };
        let n: u64 = s[..s.len() - unit.len_utf8()].parse().map_err(|_| invalid())?;
        let mult = match unit {
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            _ => return Err(invalid()),
        };
        if n == 0 {
            return Err(invalid());
        }
        let secs = n.checked_mul(mult).ok_or_else(invalid)?;
        Ok(Self { secs })
    }
}

// ---------------------------------------------------------------------------
// Raw on-chain data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Holder {
    pub address: String,
    pub balance: f64,
    pub usd_value: Option<f64>,
}

/// One processed transfer, as written to the temporary flow table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFlow {
    pub from_address: String,
    pub to_address: String,
    pub amount: f64,
    pub usd_value: f64,
    /// Unix seconds.
    pub timestamp: i64,
    pub tx_hash: String,
}

/// Entity attribution for an address, from the fetcher's intelligence lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    pub name: Option<String>,
    pub kind: Option<String>,
}

impl EntityInfo {
    /// Liquidity pools, exchanges and bridges hold supply on behalf of others.
    pub fn is_infrastructure(&self) -> bool {
        let matches = |s: &str| {
            let s = s.to_ascii_lowercase();
            ["amm", "dex", "pool", "cex", "exchange", "bridge", "uniswap", "raydium"]
                .iter()
                .any(|needle| s.contains(needle))
        };
        self.kind.as_deref().is_some_and(matches) || self.name.as_deref().is_some_and(matches)
    }
}

// ---------------------------------------------------------------------------
// Signal producer outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct HolderAnalysis {
    /// Holders considered after infrastructure exclusion.
    pub holders_considered: usize,
    pub infrastructure_excluded: usize,
    /// Percent (0–100) of tracked supply held by the ten largest holders.
    pub top10_share: f64,
    /// Herfindahl–Hirschman index over supply shares, 0–1.
    pub hhi: f64,
    /// Gini coefficient over balances, 0–1.
    pub gini: f64,
    /// 0–100.
    pub concentration_risk: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WashFlag {
    SelfTransfer,
    RoundTrip,
    RepeatedPair,
    MatchedVolume,
}

impl WashFlag {
    /// Contribution of a fired heuristic to the wallet's wash score.
    pub fn weight(&self) -> f64 {
        match self {
            WashFlag::SelfTransfer => 40.0,
            WashFlag::RoundTrip => 35.0,
            WashFlag::RepeatedPair => 20.0,
            WashFlag::MatchedVolume => 15.0,
        }
    }
}

impl std::fmt::Display for WashFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WashFlag::SelfTransfer => "self_transfer",
            WashFlag::RoundTrip => "round_trip",
            WashFlag::RepeatedPair => "repeated_pair",
            WashFlag::MatchedVolume => "matched_volume",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WashSignal {
    /// 0–100.
    pub score: f64,
    pub flags: BTreeSet<WashFlag>,
}

#[derive(Debug, Clone, Default)]
pub struct WashTradingResult {
    /// wallet → signal
    pub wallets: HashMap<String, WashSignal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotClass {
    /// Median gap of seconds between transfers.
    HighFrequencyBot,
    /// Transfers at near-constant intervals.
    PeriodicBot,
    /// Clusters of transfers inside a short burst.
    BurstTrader,
    Human,
    /// Too few transfers to judge.
    InsufficientData,
}

impl std::fmt::Display for BotClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BotClass::HighFrequencyBot => "high_frequency_bot",
            BotClass::PeriodicBot => "periodic_bot",
            BotClass::BurstTrader => "burst_trader",
            BotClass::Human => "human",
            BotClass::InsufficientData => "insufficient_data",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BotSignal {
    /// 0–100.
    pub score: f64,
    pub classification: BotClass,
}

#[derive(Debug, Clone, Default)]
pub struct BotDetectionResult {
    /// wallet → signal
    pub wallets: HashMap<String, BotSignal>,
}

// ---------------------------------------------------------------------------
// Risk model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [RiskLevel::Critical, RiskLevel::High, RiskLevel::Medium, RiskLevel::Low];

    pub fn from_score(score: f64) -> Self {
        use crate::config::risk_thresholds::*;
        if score >= CRITICAL_MIN {
            RiskLevel::Critical
        } else if score >= HIGH_MIN {
            RiskLevel::High
        } else if score >= MEDIUM_MIN {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Critical => "CRITICAL",
            RiskLevel::High => "HIGH",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::Low => "LOW",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiskDistribution {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl RiskDistribution {
    pub fn record(&mut self, level: RiskLevel) {
        *self.count_mut(level) += 1;
    }

    pub fn count(&self, level: RiskLevel) -> usize {
        match level {
            RiskLevel::Critical => self.critical,
            RiskLevel::High => self.high,
            RiskLevel::Medium => self.medium,
            RiskLevel::Low => self.low,
        }
    }

    pub fn count_mut(&mut self, level: RiskLevel) -> &mut usize {
        match level {
            RiskLevel::Critical => &mut self.critical,
            RiskLevel::High => &mut self.high,
            RiskLevel::Medium => &mut self.medium,
            RiskLevel::Low => &mut self.low,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TokenRiskSummary {
    /// Higher is better.
    pub global_health_score: f64,
    /// Lower is better.
    pub global_risk_score: f64,
    pub concentration_risk: f64,
    pub bot_risk: f64,
    pub wash_trading_risk: f64,
    pub distribution: RiskDistribution,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalletRiskRecord {
    pub wallet: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub bot_classification: String,
    pub wash_trading_flags: BTreeSet<WashFlag>,
    pub wash_score: f64,
    pub bot_score: f64,
}

impl WalletRiskRecord {
    /// `;`-joined flag names, empty when nothing fired.
    pub fn flags_label(&self) -> String {
        self.wash_trading_flags
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(";")
    }
}
