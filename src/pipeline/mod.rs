//! Per-token orchestration of the fetch → detect → score → persist stages.

pub mod orchestrator;
pub mod stage;

pub use orchestrator::{Pipeline, TokenOutcome, TokenStatus};
pub use stage::{Stage, StageOutcome};
