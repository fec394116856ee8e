pub mod artifact;
pub mod config;
pub mod detector;
pub mod error;
pub mod fetcher;
pub mod pipeline;
pub mod scorer;
pub mod types;
pub mod viewer;
