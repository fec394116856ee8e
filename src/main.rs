use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use token_risk::config::Config;
use token_risk::error::Result;
use token_risk::pipeline::{Pipeline, TokenStatus};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let cfg = match Config::from_env().and_then(|c| c.validate().map(|()| c)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let tokens = cfg.token_list();
    info!(
        "Risk pipeline starting: {} token(s) on {} | window={} | quick_mode={} | output={}",
        tokens.len(),
        cfg.chain,
        cfg.time_window,
        cfg.quick_mode,
        cfg.output_dir.display(),
    );

    let pipeline = Pipeline::from_config(&cfg)?;
    let outcomes = pipeline.run(&tokens).await;

    for outcome in &outcomes {
        match &outcome.status {
            TokenStatus::Completed { artifacts, wallets, holder_analysis } => {
                let report = artifacts
                    .report
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "—".to_string());
                info!(
                    token = %outcome.token,
                    run = %outcome.timestamp,
                    "DONE      | wallets: {wallets} | holders: {} | report: {report}",
                    if *holder_analysis { "analysed" } else { "skipped" },
                );
            }
            TokenStatus::Abandoned { stage, reason } => {
                info!(
                    token = %outcome.token,
                    run = %outcome.timestamp,
                    "ABANDONED | stage: {stage} | reason: {reason}",
                );
            }
        }
    }

    Ok(())
}
