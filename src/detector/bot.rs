use std::collections::BTreeMap;

use async_trait::async_trait;
use hdrhistogram::Histogram;
use tracing::{debug, info};

use crate::detector::classifier::{self, ActivityObservables, BURST_WINDOW_SECS};
use crate::detector::BotDetector;
use crate::error::{AppError, Result};
use crate::types::{BotClass, BotDetectionResult, BotSignal, TimeWindow, Token, UserFlow};

/// Largest inter-transfer gap tracked by the histogram (30 days).
const MAX_GAP_SECS: u64 = 30 * 86_400;

/// Bot detector driven purely by transfer timing in the fetched flows.
pub struct ActivityBotDetector {
    window: TimeWindow,
}

impl ActivityBotDetector {
    pub fn new(window: TimeWindow) -> Self {
        Self { window }
    }

    /// Measure each wallet's activity. `timestamps` must be sorted ascending.
    fn observe(&self, hist: &mut Histogram<u64>, timestamps: &[i64]) -> ActivityObservables {
        hist.reset();
        let gaps: Vec<f64> = timestamps
            .windows(2)
            .map(|w| (w[1] - w[0]).max(0) as f64)
            .collect();
        for &gap in &gaps {
            hist.saturating_record(gap as u64);
        }

        let median_gap_secs = (!gaps.is_empty()).then(|| hist.value_at_quantile(0.5) as f64);

        let gap_cv = if gaps.len() >= 2 {
            let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
            let var = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
            (mean > 0.0).then(|| var.sqrt() / mean)
        } else {
            None
        };

        ActivityObservables {
            transfer_count: timestamps.len() as u32,
            median_gap_secs,
            gap_cv,
            max_burst: max_burst(timestamps),
            transfers_per_hour: timestamps.len() as f64 / self.window.hours().max(1.0 / 60.0),
        }
    }
}

#[async_trait]
impl BotDetector for ActivityBotDetector {
    async fn classify(
        &self,
        token: &Token,
        flows: &[UserFlow],
        sample_size: Option<usize>,
    ) -> Result<BotDetectionResult> {
        // wallet → transfer timestamps, ordered by wallet for deterministic sampling
        let mut activity: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
        for flow in flows {
            activity.entry(flow.from_address.as_str()).or_default().push(flow.timestamp);
            if flow.to_address != flow.from_address {
                activity.entry(flow.to_address.as_str()).or_default().push(flow.timestamp);
            }
        }

        let total_wallets = activity.len();
        let take = sample_size.unwrap_or(total_wallets);
        if take < total_wallets {
            debug!(token = %token, sample = take, total_wallets, "Bot detector sampling wallets");
        }

        let mut hist = Histogram::<u64>::new_with_max(MAX_GAP_SECS, 2)
            .map_err(|e| AppError::Detector(format!("gap histogram: {e}")))?;

        let mut result = BotDetectionResult::default();
        for (wallet, mut timestamps) in activity.into_iter().take(take) {
            timestamps.sort_unstable();
            let obs = self.observe(&mut hist, &timestamps);
            let (classification, score) = classifier::classify(&obs);
            result
                .wallets
                .insert(wallet.to_string(), BotSignal { score, classification });
        }

        let bots = result
            .wallets
            .values()
            .filter(|s| {
                matches!(
                    s.classification,
                    BotClass::HighFrequencyBot | BotClass::PeriodicBot | BotClass::BurstTrader
                )
            })
            .count();
        info!(
            token = %token,
            classified = result.wallets.len(),
            bots,
            "Bot detection complete: {bots}/{} wallets show automated patterns",
            result.wallets.len(),
        );
        Ok(result)
    }
}

/// Most timestamps inside any BURST_WINDOW_SECS span. `timestamps` sorted ascending.
fn max_burst(timestamps: &[i64]) -> u32 {
    let mut best = 0usize;
    let mut start = 0usize;
    for end in 0..timestamps.len() {
        while timestamps[end] - timestamps[start] > BURST_WINDOW_SECS {
            start += 1;
        }
        best = best.max(end - start + 1);
    }
    best as u32
}
