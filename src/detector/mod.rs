pub mod bot;
pub mod classifier;
pub mod holder;
pub mod wash;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::fetcher::DataFetcher;
use crate::types::{BotDetectionResult, Holder, HolderAnalysis, Token, UserFlow, WashTradingResult};

pub use bot::ActivityBotDetector;
pub use holder::ConcentrationAnalyzer;
pub use wash::FlowTableWashDetector;

/// Scores how concentrated a token's supply is. Gets the fetcher for
/// follow-up lookups on the largest holders. `Ok(None)` when no holder is
/// left to measure.
#[async_trait]
pub trait HolderAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        token: &Token,
        holders: &[Holder],
        fetcher: &dyn DataFetcher,
    ) -> Result<Option<HolderAnalysis>>;
}

/// Flags wash-trading wallets. Reads flows from the table the orchestrator
/// persisted, never from memory.
#[async_trait]
pub trait WashTradingDetector: Send + Sync {
    async fn detect(&self, token: &Token, flows_path: &Path) -> Result<WashTradingResult>;
}

/// Classifies wallets by transfer cadence. `sample_size` caps how many wallets
/// are classified.
#[async_trait]
pub trait BotDetector: Send + Sync {
    async fn classify(
        &self,
        token: &Token,
        flows: &[UserFlow],
        sample_size: Option<usize>,
    ) -> Result<BotDetectionResult>;
}
