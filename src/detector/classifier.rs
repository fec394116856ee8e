use crate::types::BotClass;

/// Fewer transfers than this and a wallet is not judged.
pub const MIN_TRANSFERS: u32 = 3;

/// Median gap (seconds) at or below which a busy wallet is high-frequency.
pub const HIGH_FREQUENCY_MAX_GAP_SECS: f64 = 10.0;
pub const HIGH_FREQUENCY_MIN_TRANSFERS: u32 = 10;

/// Coefficient of variation of gaps below which cadence is machine-regular.
pub const PERIODIC_MAX_CV: f64 = 0.1;
pub const PERIODIC_MIN_TRANSFERS: u32 = 5;

/// Transfers inside one BURST_WINDOW_SECS span that count as a burst.
pub const BURST_WINDOW_SECS: i64 = 60;
pub const BURST_MIN_TRANSFERS: u32 = 5;

/// Cap for the rate-based score given to wallets classified as human.
const HUMAN_MAX_SCORE: f64 = 30.0;

/// Per-wallet activity measurements the classifier works from.
#[derive(Debug, Clone)]
pub struct ActivityObservables {
    pub transfer_count: u32,
    /// Median seconds between consecutive transfers (None below two transfers).
    pub median_gap_secs: Option<f64>,
    /// Standard deviation over mean of the gaps (None when undefined).
    pub gap_cv: Option<f64>,
    /// Most transfers seen inside any BURST_WINDOW_SECS span.
    pub max_burst: u32,
    pub transfers_per_hour: f64,
}

/// Classify a wallet and give it a 0–100 bot score.
/// Rules are checked from most to least machine-like; the first match wins.
pub fn classify(obs: &ActivityObservables) -> (BotClass, f64) {
    if obs.transfer_count < MIN_TRANSFERS {
        return (BotClass::InsufficientData, 0.0);
    }

    if obs.transfer_count >= HIGH_FREQUENCY_MIN_TRANSFERS
        && obs.median_gap_secs.is_some_and(|g| g <= HIGH_FREQUENCY_MAX_GAP_SECS)
    {
        return (BotClass::HighFrequencyBot, 90.0);
    }

    if obs.transfer_count >= PERIODIC_MIN_TRANSFERS && obs.gap_cv.is_some_and(|cv| cv < PERIODIC_MAX_CV) {
        return (BotClass::PeriodicBot, 75.0);
    }

    if obs.max_burst >= BURST_MIN_TRANSFERS {
        return (BotClass::BurstTrader, 55.0);
    }

    (BotClass::Human, (obs.transfers_per_hour * 10.0).min(HUMAN_MAX_SCORE))
}
