use std::path::PathBuf;

use crate::error::{AppError, Result};
use crate::types::{TimeWindow, Token};

pub const ARKHAM_API_URL: &str = "https://api.arkhamintelligence.com";

pub const DEFAULT_OUTPUT_DIR: &str = "outputs/risk_score_analysis";
pub const DEFAULT_PROCESSED_DIR: &str = "outputs/data/processed";
pub const DEFAULT_TIME_WINDOW: &str = "24h";

/// Per-request timeout for the Arkham client (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Wallets handed to the bot detector when QUICK_MODE is on.
pub const QUICK_MODE_SAMPLE_SIZE: usize = 50;

/// Largest holders looked up through the fetcher during the holder deep-dive.
pub const HOLDER_DEEP_DIVE_COUNT: usize = 10;

/// Wallets listed in the body of the text report.
pub const REPORT_TOP_WALLETS: usize = 10;

/// Rows shown in the viewer's ranked table.
pub const VIEWER_TOP_WALLETS: usize = 10;

/// Risk level thresholds on the 0–100 wallet risk score.
/// Lower bounds are inclusive, so a score sitting exactly on a boundary
/// lands in the higher tier.
pub mod risk_thresholds {
    pub const CRITICAL_MIN: f64 = 75.0;
    pub const HIGH_MIN: f64 = 50.0;
    pub const MEDIUM_MIN: f64 = 25.0;
}

/// Weights used by the combined scorer.
pub mod score_weights {
    /// Per-wallet blend of the two sub-signals.
    pub const WALLET_WASH: f64 = 0.55;
    pub const WALLET_BOT: f64 = 0.45;
    /// Added when both sub-signals reach FLAGGED_MIN.
    pub const CONFLUENCE_BONUS: f64 = 10.0;
    /// A sub-signal at or above this counts the wallet as flagged.
    pub const FLAGGED_MIN: f64 = 50.0;

    /// Token-level blend of the three sub-risks.
    pub const GLOBAL_CONCENTRATION: f64 = 0.30;
    pub const GLOBAL_BOT: f64 = 0.35;
    pub const GLOBAL_WASH: f64 = 0.35;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Token addresses to assess, in order (TOKENS, comma-separated)
    pub tokens: Vec<String>,
    /// Chain every token lives on (CHAIN), e.g. "ethereum", "solana"
    pub chain: String,
    /// ARKHAM_API_KEY
    pub arkham_api_key: String,
    pub arkham_api_url: String,
    /// Lookback for transfer flows (TIME_WINDOW), e.g. "24h", "7d"
    pub time_window: String,
    /// Sample the bot detector down to QUICK_MODE_SAMPLE_SIZE wallets (QUICK_MODE)
    pub quick_mode: bool,
    /// Where report/table pairs land (OUTPUT_DIR)
    pub output_dir: PathBuf,
    /// Where the temporary flow tables land (PROCESSED_DIR)
    pub processed_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. `from_env` is the production caller;
    /// tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let quick_mode = match lookup("QUICK_MODE") {
            Some(v) => parse_bool(&v).ok_or_else(|| {
                AppError::Config(format!("QUICK_MODE must be a boolean, got {v:?}"))
            })?,
            None => false,
        };

        Ok(Self {
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            tokens: lookup("TOKENS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            chain: lookup("CHAIN").unwrap_or_default().trim().to_string(),
            arkham_api_key: lookup("ARKHAM_API_KEY").unwrap_or_default().trim().to_string(),
            arkham_api_url: lookup("ARKHAM_API_URL").unwrap_or_else(|| ARKHAM_API_URL.to_string()),
            time_window: lookup("TIME_WINDOW").unwrap_or_else(|| DEFAULT_TIME_WINDOW.to_string()),
            quick_mode,
            output_dir: lookup("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            processed_dir: lookup("PROCESSED_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROCESSED_DIR)),
        })
    }

    /// Checks everything the pipeline needs before the first token is touched.
    pub fn validate(&self) -> Result<()> {
        if self.tokens.is_empty() {
            return Err(AppError::Config("TOKENS must list at least one token address".to_string()));
        }
        if self.chain.is_empty() {
            return Err(AppError::Config("CHAIN must be set".to_string()));
        }
        if self.arkham_api_key.is_empty() {
            return Err(AppError::Config("ARKHAM_API_KEY must be set".to_string()));
        }
        self.window()?;
        Ok(())
    }

    pub fn window(&self) -> Result<TimeWindow> {
        self.time_window.parse()
    }

    pub fn token_list(&self) -> Vec<Token> {
        self.tokens
            .iter()
            .map(|address| Token::new(address.clone(), self.chain.clone()))
            .collect()
    }

    pub fn bot_sample_size(&self) -> Option<usize> {
        self.quick_mode.then_some(QUICK_MODE_SAMPLE_SIZE)
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
