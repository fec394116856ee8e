pub mod combined;

pub use combined::{CombinedScorer, ScoredRun};
