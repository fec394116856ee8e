use crate::error::{AppError, Result};
use crate::types::{BotDetectionResult, WashTradingResult};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    HolderFetch,
    HolderAnalysis,
    FlowFetch,
    FlowPersist,
    WashTrading,
    BotDetection,
    Scoring,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::HolderFetch => "holder_fetch",
            Stage::HolderAnalysis => "holder_analysis",
            Stage::FlowFetch => "flow_fetch",
            Stage::FlowPersist => "flow_persist",
            Stage::WashTrading => "wash_trading",
            Stage::BotDetection => "bot_detection",
            Stage::Scoring => "scoring",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stage output that can legitimately come back empty.
pub trait StageData {
    fn is_absent(&self) -> bool;
}

impl<T> StageData for Vec<T> {
    fn is_absent(&self) -> bool {
        self.is_empty()
    }
}

impl<T> StageData for Option<T> {
    fn is_absent(&self) -> bool {
        self.is_none()
    }
}

impl StageData for WashTradingResult {
    fn is_absent(&self) -> bool {
        self.wallets.is_empty()
    }
}

impl StageData for BotDetectionResult {
    fn is_absent(&self) -> bool {
        self.wallets.is_empty()
    }
}

/// What one stage produced. The orchestrator decides per stage whether
/// `DataAbsent` and `Failed` skip forward or abandon the token.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Success(T),
    /// Nothing to work with; not an error.
    DataAbsent,
    Failed(AppError),
}

impl<T: StageData> StageOutcome<T> {
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(v) if v.is_absent() => StageOutcome::DataAbsent,
            Ok(v) => StageOutcome::Success(v),
            Err(e) => StageOutcome::Failed(e),
        }
    }
}
