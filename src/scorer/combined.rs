use std::collections::BTreeSet;

use tracing::info;

use crate::config::score_weights::*;
use crate::types::{
    BotDetectionResult, HolderAnalysis, RiskDistribution, RiskLevel, Token, TokenRiskSummary,
    WalletRiskRecord, WashTradingResult,
};

/// Classification given to a wallet the bot detector never saw.
pub const UNCLASSIFIED: &str = "unclassified";

/// Output of one scoring pass.
#[derive(Debug, Clone, Default)]
pub struct ScoredRun {
    pub summary: TokenRiskSummary,
    /// Highest risk first; equal scores ordered by wallet address.
    pub records: Vec<WalletRiskRecord>,
}

/// Merges the signal producers into per-wallet records and a token summary.
#[derive(Debug, Default)]
pub struct CombinedScorer;

impl CombinedScorer {
    pub fn new() -> Self {
        Self
    }

    /// Outer-joins the two per-wallet results on address. A wallet missing
    /// from one side contributes a zero sub-signal for that side.
    pub fn score(
        &self,
        wash: &WashTradingResult,
        bot: &BotDetectionResult,
        holders: Option<&HolderAnalysis>,
        token: &Token,
    ) -> ScoredRun {
        let wallets: BTreeSet<&str> = wash
            .wallets
            .keys()
            .chain(bot.wallets.keys())
            .map(String::as_str)
            .collect();

        let mut records: Vec<WalletRiskRecord> = wallets
            .into_iter()
            .map(|wallet| {
                let w = wash.wallets.get(wallet);
                let b = bot.wallets.get(wallet);
                let wash_score = w.map(|s| s.score).unwrap_or(0.0);
                let bot_score = b.map(|s| s.score).unwrap_or(0.0);
                let risk_score = wallet_risk(wash_score, bot_score);
                WalletRiskRecord {
                    wallet: wallet.to_string(),
                    risk_score,
                    risk_level: RiskLevel::from_score(risk_score),
                    bot_classification: b
                        .map(|s| s.classification.to_string())
                        .unwrap_or_else(|| UNCLASSIFIED.to_string()),
                    wash_trading_flags: w.map(|s| s.flags.clone()).unwrap_or_default(),
                    wash_score,
                    bot_score,
                }
            })
            .collect();

        // wallets arrive address-sorted, so a stable sort leaves ties in address order
        records.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));

        let summary = summarize(&records, holders);
        info!(
            token = %token,
            wallets = records.len(),
            global_risk = summary.global_risk_score,
            critical = summary.distribution.critical,
            high = summary.distribution.high,
            "Scored {} wallets: health {:.2}, risk {:.2}",
            records.len(),
            summary.global_health_score,
            summary.global_risk_score,
        );

        ScoredRun { summary, records }
    }
}

/// Per-wallet risk, 0–100 (higher = riskier).
/// Weighted blend of the sub-signals plus a bonus when both are flagged.
pub fn wallet_risk(wash_score: f64, bot_score: f64) -> f64 {
    let wash = clamp_score(wash_score);
    let bot = clamp_score(bot_score);
    let confluence = if wash >= FLAGGED_MIN && bot >= FLAGGED_MIN {
        CONFLUENCE_BONUS
    } else {
        0.0
    };
    round2(clamp_score(WALLET_WASH * wash + WALLET_BOT * bot + confluence))
}

/// Token-level sub-risk for one signal: half the mean, half the share of
/// wallets at or above FLAGGED_MIN.
pub fn sub_risk(scores: impl Iterator<Item = f64>) -> f64 {
    let (mut sum, mut flagged, mut n) = (0.0, 0usize, 0usize);
    for s in scores {
        let s = clamp_score(s);
        sum += s;
        if s >= FLAGGED_MIN {
            flagged += 1;
        }
        n += 1;
    }
    if n == 0 {
        return 0.0;
    }
    let mean = sum / n as f64;
    let share = flagged as f64 / n as f64;
    clamp_score(0.5 * mean + 0.5 * 100.0 * share)
}

fn summarize(records: &[WalletRiskRecord], holders: Option<&HolderAnalysis>) -> TokenRiskSummary {
    if records.is_empty() {
        return TokenRiskSummary::default();
    }

    let mut distribution = RiskDistribution::default();
    for r in records {
        distribution.record(r.risk_level);
    }

    let concentration_risk = holders.map(|h| clamp_score(h.concentration_risk)).unwrap_or(0.0);
    let bot_risk = sub_risk(records.iter().map(|r| r.bot_score));
    let wash_trading_risk = sub_risk(records.iter().map(|r| r.wash_score));

    let global_risk_score = clamp_score(
        GLOBAL_CONCENTRATION * concentration_risk + GLOBAL_BOT * bot_risk + GLOBAL_WASH * wash_trading_risk,
    );

    TokenRiskSummary {
        global_health_score: round2(100.0 - global_risk_score),
        global_risk_score: round2(global_risk_score),
        concentration_risk: round2(concentration_risk),
        bot_risk: round2(bot_risk),
        wash_trading_risk: round2(wash_trading_risk),
        distribution,
    }
}

/// NaN counts as no signal.
fn clamp_score(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 100.0)
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
