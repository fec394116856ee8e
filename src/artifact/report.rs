//! Text report codec.
//!
//! The report carries the summary twice: a field-tagged `[summary]` block that
//! the reader prefers, and the labeled lines older reports were made of. The
//! reader falls back to the labeled lines field by field, then to zero.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::artifact::write_atomically;
use crate::config::REPORT_TOP_WALLETS;
use crate::error::Result;
use crate::types::{RiskDistribution, RiskLevel, RunTimestamp, Token, TokenRiskSummary, WalletRiskRecord};

pub const REPORT_FORMAT: &str = "token-risk-report/v1";

const SUMMARY_HEADER: &str = "[summary]";
const RULE: &str = "======================================================================";
const THIN_RULE: &str = "----------------------------------------------------------------------";

// Field-tagged keys.
const KEY_FORMAT: &str = "format";
const KEY_HEALTH: &str = "global_health_score";
const KEY_RISK: &str = "global_risk_score";
const KEY_CONCENTRATION: &str = "concentration_risk";
const KEY_BOT: &str = "bot_risk";
const KEY_WASH: &str = "wash_trading_risk";
const KEY_CRITICAL: &str = "dist_critical";
const KEY_HIGH: &str = "dist_high";
const KEY_MEDIUM: &str = "dist_medium";
const KEY_LOW: &str = "dist_low";

// Labeled lines.
const LABEL_HEALTH: &str = "TOKEN GLOBAL HEALTH SCORE:";
const LABEL_RISK: &str = "Global Risk Score:";
const LABEL_CONCENTRATION: &str = "Concentration Risk:";
const LABEL_BOT: &str = "Bot Activity Risk:";
const LABEL_WASH: &str = "Wash Trading Risk:";

fn dist_key(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Critical => KEY_CRITICAL,
        RiskLevel::High => KEY_HIGH,
        RiskLevel::Medium => KEY_MEDIUM,
        RiskLevel::Low => KEY_LOW,
    }
}

/// Render the full report text.
pub fn render_report(
    token: &Token,
    timestamp: RunTimestamp,
    summary: &TokenRiskSummary,
    records: &[WalletRiskRecord],
) -> String {
    let mut out = String::new();
    // fmt::Write for String never fails
    let _ = write_body(&mut out, token, timestamp, summary, records);
    out
}

fn write_body(
    out: &mut String,
    token: &Token,
    timestamp: RunTimestamp,
    summary: &TokenRiskSummary,
    records: &[WalletRiskRecord],
) -> std::fmt::Result {
    let d = &summary.distribution;
    let total = d.total();

    writeln!(out, "{RULE}")?;
    writeln!(out, "TOKEN RISK ASSESSMENT REPORT")?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "Token: {}", token.address)?;
    writeln!(out, "Chain: {}", token.chain)?;
    writeln!(out, "Run: {timestamp}")?;
    writeln!(out, "Wallets scored: {total}")?;
    writeln!(out)?;

    // Tagged values keep full precision so they read back exactly.
    writeln!(out, "{SUMMARY_HEADER}")?;
    writeln!(out, "{KEY_FORMAT}: {REPORT_FORMAT}")?;
    writeln!(out, "{KEY_HEALTH}: {}", summary.global_health_score)?;
    writeln!(out, "{KEY_RISK}: {}", summary.global_risk_score)?;
    writeln!(out, "{KEY_CONCENTRATION}: {}", summary.concentration_risk)?;
    writeln!(out, "{KEY_BOT}: {}", summary.bot_risk)?;
    writeln!(out, "{KEY_WASH}: {}", summary.wash_trading_risk)?;
    for level in RiskLevel::ALL {
        writeln!(out, "{}: {}", dist_key(level), d.count(level))?;
    }
    writeln!(out)?;

    writeln!(out, "{THIN_RULE}")?;
    writeln!(out, "{LABEL_HEALTH} {:.2}", summary.global_health_score)?;
    writeln!(out, "{LABEL_RISK} {:.2}", summary.global_risk_score)?;
    writeln!(out)?;
    writeln!(out, "RISK BREAKDOWN")?;
    writeln!(out, "{LABEL_CONCENTRATION} {:.2}", summary.concentration_risk)?;
    writeln!(out, "{LABEL_BOT} {:.2}", summary.bot_risk)?;
    writeln!(out, "{LABEL_WASH} {:.2}", summary.wash_trading_risk)?;
    writeln!(out)?;
    writeln!(out, "RISK DISTRIBUTION")?;
    for level in RiskLevel::ALL {
        let count = d.count(level);
        let pct = if total > 0 { count as f64 / total as f64 * 100.0 } else { 0.0 };
        writeln!(out, "{level} : {count} wallets ({pct:.1}%)")?;
    }
    writeln!(out)?;

    writeln!(out, "TOP {} HIGHEST RISK WALLETS", REPORT_TOP_WALLETS.min(records.len()))?;
    for (i, r) in records.iter().take(REPORT_TOP_WALLETS).enumerate() {
        writeln!(
            out,
            "{:>2}. {}  score={:.2}  level={}  bot={}  wash=[{}]",
            i + 1,
            r.wallet,
            r.risk_score,
            r.risk_level,
            r.bot_classification,
            r.flags_label(),
        )?;
    }
    writeln!(out, "{RULE}")
}

pub fn write_report(
    path: &Path,
    token: &Token,
    timestamp: RunTimestamp,
    summary: &TokenRiskSummary,
    records: &[WalletRiskRecord],
) -> Result<()> {
    let text = render_report(token, timestamp, summary, records);
    write_atomically(path, |w| {
        w.write_all(text.as_bytes())?;
        Ok(())
    })
}

/// Read and parse a report. Only I/O failures are errors; unreadable fields
/// default to zero.
pub fn read_report(path: &Path) -> Result<TokenRiskSummary> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_report(&content))
}

pub fn parse_report(content: &str) -> TokenRiskSummary {
    let tagged = tagged_fields(content);

    let float = |key: &str, label: &str| -> f64 {
        tagged
            .get(key)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .or_else(|| legacy_float(content, label))
            .unwrap_or(0.0)
    };
    let count = |level: RiskLevel| -> usize {
        tagged
            .get(dist_key(level))
            .and_then(|v| v.parse::<usize>().ok())
            .or_else(|| legacy_count(content, level.as_str()))
            .unwrap_or(0)
    };

    TokenRiskSummary {
        global_health_score: float(KEY_HEALTH, LABEL_HEALTH),
        global_risk_score: float(KEY_RISK, LABEL_RISK),
        concentration_risk: float(KEY_CONCENTRATION, LABEL_CONCENTRATION),
        bot_risk: float(KEY_BOT, LABEL_BOT),
        wash_trading_risk: float(KEY_WASH, LABEL_WASH),
        distribution: RiskDistribution {
            critical: count(RiskLevel::Critical),
            high: count(RiskLevel::High),
            medium: count(RiskLevel::Medium),
            low: count(RiskLevel::Low),
        },
    }
}

/// `key: value` pairs of the `[summary]` block, if it declares a known format.
fn tagged_fields(content: &str) -> HashMap<&str, &str> {
    let mut fields = HashMap::new();
    let mut lines = content.lines().skip_while(|l| l.trim() != SUMMARY_HEADER);
    if lines.next().is_none() {
        return fields;
    }
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim(), value.trim());
        }
    }
    if fields.get(KEY_FORMAT) != Some(&REPORT_FORMAT) {
        fields.clear();
    }
    fields
}

/// First `<label> <number>` anywhere in the text.
fn legacy_float(content: &str, label: &str) -> Option<f64> {
    content.lines().find_map(|line| {
        let rest = &line[line.find(label)? + label.len()..];
        let rest = rest.trim_start();
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        rest[..end].parse::<f64>().ok()
    })
}

/// First `<LEVEL> : <n> wallets` anywhere in the text.
fn legacy_count(content: &str, level: &str) -> Option<usize> {
    content.lines().find_map(|line| {
        line.match_indices(level).find_map(|(idx, _)| {
            let rest = line[idx + level.len()..].trim_start();
            let rest = rest.strip_prefix(':')?.trim_start();
            let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            let (digits, tail) = rest.split_at(end);
            if !tail.trim_start().starts_with("wallets") {
                return None;
            }
            digits.parse::<usize>().ok()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample_summary() -> TokenRiskSummary {
        TokenRiskSummary {
            global_health_score: 61.25,
            global_risk_score: 38.75,
            concentration_risk: 72.1,
            bot_risk: 20.5,
            wash_trading_risk: 30.0,
            distribution: RiskDistribution { critical: 2, high: 5, medium: 11, low: 40 },
        }
    }

    fn record(wallet: &str, score: f64) -> WalletRiskRecord {
        WalletRiskRecord {
            wallet: wallet.to_string(),
            risk_score: score,
            risk_level: RiskLevel::from_score(score),
            bot_classification: "human".to_string(),
            wash_trading_flags: BTreeSet::new(),
            wash_score: 0.0,
            bot_score: 0.0,
        }
    }

    #[test]
    fn report_round_trips() {
        let token = Token::new("0xabc", "ethereum");
        let ts: RunTimestamp = "20240101_120000".parse().unwrap();
        let summary = sample_summary();
        let text = render_report(&token, ts, &summary, &[record("0x1", 80.0), record("0x2", 10.0)]);
        assert_eq!(parse_report(&text), summary);
    }

    #[test]
    fn unrounded_scores_read_back_exactly() {
        let token = Token::new("0xabc", "ethereum");
        let ts: RunTimestamp = "20240101_120000".parse().unwrap();
        let summary = TokenRiskSummary {
            global_health_score: 66.666666667,
            global_risk_score: 33.333333333,
            concentration_risk: 0.1 + 0.2,
            ..sample_summary()
        };
        let text = render_report(&token, ts, &summary, &[]);
        assert!(text.contains("global_risk_score: 33.333333333"));
        assert!(text.contains("Global Risk Score: 33.33"));
        assert_eq!(parse_report(&text), summary);
    }

    #[test]
    fn report_contains_labeled_lines() {
        let token = Token::new("0xabc", "ethereum");
        let ts: RunTimestamp = "20240101_120000".parse().unwrap();
        let text = render_report(&token, ts, &sample_summary(), &[]);
        for line in [
            "TOKEN GLOBAL HEALTH SCORE: 61.25",
            "Global Risk Score: 38.75",
            "Concentration Risk: 72.10",
            "Bot Activity Risk: 20.50",
            "Wash Trading Risk: 30.00",
            "CRITICAL : 2 wallets",
            "HIGH : 5 wallets",
            "MEDIUM : 11 wallets",
            "LOW : 40 wallets",
        ] {
            assert!(text.contains(line), "missing {line:?}");
        }
    }

    #[test]
    fn legacy_report_without_bot_line_defaults_to_zero() {
        let legacy = "\
TOKEN GLOBAL HEALTH SCORE: 55.5
Global Risk Score: 44.5
Concentration Risk: 60.0
Wash Trading Risk: 12.25
   CRITICAL : 1 wallets (2.0%)
   HIGH : 3 wallets
   MEDIUM: 7 wallets
   LOW : 39 wallets
";
        let s = parse_report(legacy);
        assert_eq!(s.bot_risk, 0.0);
        assert_eq!(s.global_health_score, 55.5);
        assert_eq!(s.wash_trading_risk, 12.25);
        assert_eq!(s.distribution, RiskDistribution { critical: 1, high: 3, medium: 7, low: 39 });
    }

    #[test]
    fn tagged_field_falls_back_to_labeled_line() {
        let text = "\
[summary]
format: token-risk-report/v1
global_health_score: 70.00
bot_risk: n/a

Bot Activity Risk: 15.5
HIGH : 4 wallets
";
        let s = parse_report(text);
        assert_eq!(s.global_health_score, 70.0);
        assert_eq!(s.bot_risk, 15.5);
        assert_eq!(s.distribution.high, 4);
        assert_eq!(s.global_risk_score, 0.0);
    }

    #[test]
    fn unknown_format_ignores_tagged_block() {
        let text = "[summary]\nformat: something-else/v9\nglobal_risk_score: 99\n\nGlobal Risk Score: 12\n";
        assert_eq!(parse_report(text).global_risk_score, 12.0);
    }

    #[test]
    fn wallet_lines_are_not_mistaken_for_counts() {
        let text = " 1. 0xabc  score=90.00  level=CRITICAL  bot=human  wash=[]\nCRITICAL : 2 wallets\n";
        assert_eq!(parse_report(text).distribution.critical, 2);
    }

    #[test]
    fn empty_report_is_all_zero() {
        assert_eq!(parse_report(""), TokenRiskSummary::default());
    }
}
