use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::artifact::flows::read_flows;
use crate::detector::WashTradingDetector;
use crate::error::Result;
use crate::types::{Token, UserFlow, WashFlag, WashSignal, WashTradingResult};

/// A return leg must land within this many seconds of the outbound leg.
pub const ROUND_TRIP_MAX_SECS: i64 = 3600;
/// Relative amount tolerance for round trips and matched volume.
pub const AMOUNT_TOLERANCE: f64 = 0.05;
/// Transfers on one directed pair before it counts as repeated.
pub const REPEATED_PAIR_MIN: usize = 3;
/// Transfers a wallet needs before matched in/out volume is meaningful.
pub const MATCHED_VOLUME_MIN_TRANSFERS: usize = 4;

/// Wash-trading detector over the persisted flow table.
#[derive(Default)]
pub struct FlowTableWashDetector;

impl FlowTableWashDetector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WashTradingDetector for FlowTableWashDetector {
    async fn detect(&self, token: &Token, flows_path: &Path) -> Result<WashTradingResult> {
        let flows = read_flows(flows_path)?;
        let result = detect_wash_trading(&flows);

        let flagged = result.wallets.values().filter(|s| !s.flags.is_empty()).count();
        info!(
            token = %token,
            flows = flows.len(),
            wallets = result.wallets.len(),
            flagged,
            "Wash trading analysis: {flagged}/{} wallets flagged",
            result.wallets.len(),
        );
        Ok(result)
    }
}

fn within_tolerance(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs());
    scale > 0.0 && (a - b).abs() <= AMOUNT_TOLERANCE * scale
}

/// Run every heuristic over the flows. Every wallet that appears in a flow gets
/// an entry, flagged or not.
pub fn detect_wash_trading(flows: &[UserFlow]) -> WashTradingResult {
    let mut flags: HashMap<&str, BTreeSet<WashFlag>> = HashMap::new();
    // wallet → (inflow, outflow, transfers)
    let mut volume: HashMap<&str, (f64, f64, usize)> = HashMap::new();
    let mut pair_counts: HashMap<(&str, &str), usize> = HashMap::new();
    // unordered pair → flows between the two wallets
    let mut legs: HashMap<(&str, &str), Vec<&UserFlow>> = HashMap::new();

    for flow in flows {
        let from = flow.from_address.as_str();
        let to = flow.to_address.as_str();
        flags.entry(from).or_default();
        flags.entry(to).or_default();

        if from == to {
            flags.entry(from).or_default().insert(WashFlag::SelfTransfer);
            continue;
        }

        let out = volume.entry(from).or_default();
        out.1 += flow.amount;
        out.2 += 1;
        let inn = volume.entry(to).or_default();
        inn.0 += flow.amount;
        inn.2 += 1;

        *pair_counts.entry((from, to)).or_default() += 1;
        let key = if from < to { (from, to) } else { (to, from) };
        legs.entry(key).or_default().push(flow);
    }

    for (&(from, to), &count) in &pair_counts {
        if count >= REPEATED_PAIR_MIN {
            flags.entry(from).or_default().insert(WashFlag::RepeatedPair);
            flags.entry(to).or_default().insert(WashFlag::RepeatedPair);
        }
    }

    for (&(a, b), pair_flows) in &legs {
        if has_round_trip(pair_flows) {
            flags.entry(a).or_default().insert(WashFlag::RoundTrip);
            flags.entry(b).or_default().insert(WashFlag::RoundTrip);
        }
    }

    for (&wallet, &(inflow, outflow, transfers)) in &volume {
        if transfers >= MATCHED_VOLUME_MIN_TRANSFERS && within_tolerance(inflow, outflow) {
            flags.entry(wallet).or_default().insert(WashFlag::MatchedVolume);
        }
    }

    let wallets = flags
        .into_iter()
        .map(|(wallet, flags)| {
            let score = flags.iter().map(WashFlag::weight).sum::<f64>().clamp(0.0, 100.0);
            (wallet.to_string(), WashSignal { score, flags })
        })
        .collect();

    WashTradingResult { wallets }
}

/// True when some leg is answered by an opposite leg of a similar amount
/// within ROUND_TRIP_MAX_SECS.
fn has_round_trip(pair_flows: &[&UserFlow]) -> bool {
    pair_flows.iter().any(|out| {
        pair_flows.iter().any(|back| {
            back.from_address == out.to_address
                && back.to_address == out.from_address
                && back.timestamp >= out.timestamp
                && back.timestamp - out.timestamp <= ROUND_TRIP_MAX_SECS
                && within_tolerance(out.amount, back.amount)
        })
    })
}
