use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::artifact::flows::{temp_flows_path, write_flows};
use crate::artifact::{ArtifactPair, ArtifactStore};
use crate::config::Config;
use crate::detector::{
    ActivityBotDetector, BotDetector, ConcentrationAnalyzer, FlowTableWashDetector, HolderAnalyzer,
    WashTradingDetector,
};
use crate::error::Result;
use crate::fetcher::{ArkhamFetcher, DataFetcher};
use crate::pipeline::stage::{Stage, StageOutcome};
use crate::scorer::CombinedScorer;
use crate::types::{HolderAnalysis, RunTimestamp, TimeWindow, Token};

#[derive(Debug)]
pub enum TokenStatus {
    /// Both artifacts were written.
    Completed {
        artifacts: ArtifactPair,
        wallets: usize,
        holder_analysis: bool,
    },
    /// A stage stopped the token; later stages did not run.
    Abandoned { stage: Stage, reason: String },
}

#[derive(Debug)]
pub struct TokenOutcome {
    pub token: Token,
    pub timestamp: RunTimestamp,
    pub status: TokenStatus,
}

impl TokenOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, TokenStatus::Completed { .. })
    }
}

/// Runs every token through the stages in order, one token at a time.
/// A problem with one token never stops the next.
pub struct Pipeline {
    window: TimeWindow,
    sample_size: Option<usize>,
    processed_dir: PathBuf,
    fetcher: Box<dyn DataFetcher>,
    holder_analyzer: Box<dyn HolderAnalyzer>,
    wash_detector: Box<dyn WashTradingDetector>,
    bot_detector: Box<dyn BotDetector>,
    scorer: CombinedScorer,
    store: ArtifactStore,
}

impl Pipeline {
    pub fn new(
        cfg: &Config,
        fetcher: Box<dyn DataFetcher>,
        holder_analyzer: Box<dyn HolderAnalyzer>,
        wash_detector: Box<dyn WashTradingDetector>,
        bot_detector: Box<dyn BotDetector>,
    ) -> Result<Self> {
        Ok(Self {
            window: cfg.window()?,
            sample_size: cfg.bot_sample_size(),
            processed_dir: cfg.processed_dir.clone(),
            fetcher,
            holder_analyzer,
            wash_detector,
            bot_detector,
            scorer: CombinedScorer::new(),
            store: ArtifactStore::new(cfg.output_dir.clone()),
        })
    }

    /// Production wiring: Arkham fetcher plus the built-in detectors.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let window = cfg.window()?;
        Self::new(
            cfg,
            Box::new(ArkhamFetcher::new(cfg)?),
            Box::new(ConcentrationAnalyzer::new()),
            Box::new(FlowTableWashDetector::new()),
            Box::new(ActivityBotDetector::new(window)),
        )
    }

    pub async fn run(&self, tokens: &[Token]) -> Vec<TokenOutcome> {
        let mut outcomes = Vec::with_capacity(tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            info!(token = %token, "=== Token {}/{}: {} ===", i + 1, tokens.len(), token);
            let timestamp = RunTimestamp::now();
            let status = self.run_token(token, timestamp).await;
            match &status {
                TokenStatus::Completed { wallets, .. } => {
                    info!(token = %token, run = %timestamp, wallets, "Token analysis complete")
                }
                TokenStatus::Abandoned { stage, reason } => {
                    warn!(token = %token, stage = %stage, "Token abandoned: {reason}")
                }
            }
            outcomes.push(TokenOutcome {
                token: token.clone(),
                timestamp,
                status,
            });
        }

        let completed = outcomes.iter().filter(|o| o.is_completed()).count();
        info!(
            completed,
            abandoned = outcomes.len() - completed,
            "Pipeline finished: {completed}/{} tokens analysed",
            outcomes.len()
        );
        outcomes
    }

    async fn run_token(&self, token: &Token, timestamp: RunTimestamp) -> TokenStatus {
        // 1-2. holders are optional; nothing here can stop the token
        let holder_analysis = self.holder_stages(token).await;

        // 3. flows
        let flows = match StageOutcome::from_result(
            self.fetcher.fetch_transfer_flows(token, self.window).await,
        ) {
            StageOutcome::Success(flows) => flows,
            StageOutcome::DataAbsent => {
                return abandon(Stage::FlowFetch, format!("no transfers in the last {}", self.window.as_query()));
            }
            StageOutcome::Failed(e) => return abandon(Stage::FlowFetch, e.to_string()),
        };

        // 4. hand-off table for the wash detector
        let flows_path = temp_flows_path(&self.processed_dir, token);
        let persisted: Result<()> = std::fs::create_dir_all(&self.processed_dir)
            .map_err(Into::into)
            .and_then(|()| write_flows(&flows_path, &flows));
        if let Err(e) = persisted {
            error!(token = %token, stage = %Stage::FlowPersist, "Failed to write {}: {e}", flows_path.display());
            return abandon(Stage::FlowPersist, e.to_string());
        }
        info!(token = %token, stage = %Stage::FlowPersist, flows = flows.len(), path = %flows_path.display(), "Flows persisted");

        // 5. wash trading
        let wash = match StageOutcome::from_result(self.wash_detector.detect(token, &flows_path).await) {
            StageOutcome::Success(w) => w,
            StageOutcome::DataAbsent => return abandon(Stage::WashTrading, "no wallets in the flow table".to_string()),
            StageOutcome::Failed(e) => {
                error!(token = %token, stage = %Stage::WashTrading, "Wash trading detection failed: {e}");
                return abandon(Stage::WashTrading, e.to_string());
            }
        };

        // 6. bots
        let bots = match StageOutcome::from_result(
            self.bot_detector.classify(token, &flows, self.sample_size).await,
        ) {
            StageOutcome::Success(b) => b,
            StageOutcome::DataAbsent => return abandon(Stage::BotDetection, "no wallets classified".to_string()),
            StageOutcome::Failed(e) => {
                error!(token = %token, stage = %Stage::BotDetection, "Bot detection failed: {e}");
                return abandon(Stage::BotDetection, e.to_string());
            }
        };

        // 7. score and persist
        let scored = self.scorer.score(&wash, &bots, holder_analysis.as_ref(), token);
        match self.store.write_run(token, timestamp, &scored.summary, &scored.records) {
            Ok(artifacts) => TokenStatus::Completed {
                artifacts,
                wallets: scored.records.len(),
                holder_analysis: holder_analysis.is_some(),
            },
            Err(e) => {
                error!(token = %token, stage = %Stage::Scoring, "Failed to write artifacts: {e}");
                abandon(Stage::Scoring, e.to_string())
            }
        }
    }

    async fn holder_stages(&self, token: &Token) -> Option<HolderAnalysis> {
        let holders = match StageOutcome::from_result(self.fetcher.fetch_token_holders(token).await) {
            StageOutcome::Success(h) => h,
            StageOutcome::DataAbsent => {
                warn!(token = %token, stage = %Stage::HolderFetch, "No holder data, skipping holder analysis");
                return None;
            }
            StageOutcome::Failed(e) => {
                warn!(token = %token, stage = %Stage::HolderFetch, "Holder fetch failed, skipping holder analysis: {e}");
                return None;
            }
        };

        match StageOutcome::from_result(
            self.holder_analyzer
                .analyze(token, &holders, self.fetcher.as_ref())
                .await,
        ) {
            StageOutcome::Success(analysis) => analysis,
            StageOutcome::DataAbsent => {
                warn!(token = %token, stage = %Stage::HolderAnalysis, "No holders left to measure");
                None
            }
            StageOutcome::Failed(e) => {
                error!(token = %token, stage = %Stage::HolderAnalysis, "Holder analysis failed: {e}");
                None
            }
        }
    }
}

fn abandon(stage: Stage, reason: String) -> TokenStatus {
    TokenStatus::Abandoned { stage, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::naming::ArtifactName;
    use crate::error::AppError;
    use crate::types::{BotDetectionResult, EntityInfo, Holder, UserFlow, WashTradingResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    /// Per-token canned data. A missing key means the fetch errors.
    #[derive(Default)]
    struct FakeFetcher {
        holders: HashMap<String, Vec<Holder>>,
        flows: HashMap<String, Vec<UserFlow>>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl DataFetcher for FakeFetcher {
        async fn fetch_token_holders(&self, token: &Token) -> Result<Vec<Holder>> {
            self.calls.lock().unwrap().push(format!("holders:{}", token.address));
            self.holders
                .get(&token.address)
                .cloned()
                .ok_or_else(|| AppError::Api("holders unavailable".to_string()))
        }

        async fn fetch_transfer_flows(&self, token: &Token, _window: TimeWindow) -> Result<Vec<UserFlow>> {
            self.calls.lock().unwrap().push(format!("flows:{}", token.address));
            self.flows
                .get(&token.address)
                .cloned()
                .ok_or_else(|| AppError::Api("transfers unavailable".to_string()))
        }

        async fn lookup_entity(&self, _address: &str, _chain: &str) -> Result<Option<EntityInfo>> {
            Ok(None)
        }
    }

    struct FailingWash;

    #[async_trait]
    impl WashTradingDetector for FailingWash {
        async fn detect(&self, _token: &Token, _flows_path: &Path) -> Result<WashTradingResult> {
            Err(AppError::Detector("wash model crashed".to_string()))
        }
    }

    struct FailingBot;

    #[async_trait]
    impl BotDetector for FailingBot {
        async fn classify(
            &self,
            _token: &Token,
            _flows: &[UserFlow],
            _sample_size: Option<usize>,
        ) -> Result<BotDetectionResult> {
            Err(AppError::Detector("bot model crashed".to_string()))
        }
    }

    struct FailingHolderAnalyzer;

    #[async_trait]
    impl HolderAnalyzer for FailingHolderAnalyzer {
        async fn analyze(
            &self,
            _token: &Token,
            _holders: &[Holder],
            _fetcher: &dyn DataFetcher,
        ) -> Result<Option<HolderAnalysis>> {
            Err(AppError::Detector("holder model crashed".to_string()))
        }
    }

    struct SilentWash;

    #[async_trait]
    impl WashTradingDetector for SilentWash {
        async fn detect(&self, _token: &Token, _flows_path: &Path) -> Result<WashTradingResult> {
            Ok(WashTradingResult::default())
        }
    }

    fn config(dir: &Path) -> Config {
        let vars: HashMap<&str, String> = HashMap::from([
            ("TOKENS", "A,B".to_string()),
            ("CHAIN", "ethereum".to_string()),
            ("ARKHAM_API_KEY", "test".to_string()),
            ("OUTPUT_DIR", dir.join("out").display().to_string()),
            ("PROCESSED_DIR", dir.join("processed").display().to_string()),
        ]);
        Config::from_lookup(|k| vars.get(k).cloned()).unwrap()
    }

    fn flows() -> Vec<UserFlow> {
        [("0xa", "0xb", 100.0, 0), ("0xb", "0xa", 99.0, 60), ("0xa", "0xc", 5.0, 120)]
            .into_iter()
            .map(|(from, to, amount, ts)| UserFlow {
                from_address: from.to_string(),
                to_address: to.to_string(),
                amount,
                usd_value: amount,
                timestamp: 1_700_000_000 + ts,
                tx_hash: format!("0x{ts}"),
            })
            .collect()
    }

    fn holders() -> Vec<Holder> {
        (1..=20)
            .map(|i| Holder {
                address: format!("0xh{i}"),
                balance: i as f64 * 10.0,
                usd_value: None,
            })
            .collect()
    }

    fn pipeline(cfg: &Config, fetcher: FakeFetcher, wash: Box<dyn WashTradingDetector>, bot: Box<dyn BotDetector>) -> Pipeline {
        Pipeline::new(cfg, Box::new(fetcher), Box::new(ConcentrationAnalyzer::new()), wash, bot).unwrap()
    }

    fn default_detectors(cfg: &Config) -> (Box<dyn WashTradingDetector>, Box<dyn BotDetector>) {
        (
            Box::new(FlowTableWashDetector::new()),
            Box::new(ActivityBotDetector::new(cfg.window().unwrap())),
        )
    }

    #[tokio::test]
    async fn missing_holders_still_fetch_flows_and_next_token_runs() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let calls = Arc::new(Mutex::new(Vec::new()));
        let fetcher = FakeFetcher {
            holders: HashMap::from([("A".to_string(), Vec::new()), ("B".to_string(), holders())]),
            flows: HashMap::from([("A".to_string(), flows()), ("B".to_string(), flows())]),
            calls: Arc::clone(&calls),
        };
        let (wash, bot) = default_detectors(&cfg);
        let outcomes = pipeline(&cfg, fetcher, wash, bot).run(&cfg.token_list()).await;

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["holders:A", "flows:A", "holders:B", "flows:B"]
        );
        assert_eq!(outcomes.len(), 2);
        match &outcomes[0].status {
            TokenStatus::Completed { holder_analysis, wallets, .. } => {
                assert!(!holder_analysis);
                assert_eq!(*wallets, 3);
            }
            other => panic!("token A not completed: {other:?}"),
        }
        assert!(matches!(
            outcomes[1].status,
            TokenStatus::Completed { holder_analysis: true, .. }
        ));
    }

    #[tokio::test]
    async fn holder_fetch_error_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let fetcher = FakeFetcher {
            flows: HashMap::from([("A".to_string(), flows())]),
            ..Default::default()
        };
        let (wash, bot) = default_detectors(&cfg);
        let outcomes = pipeline(&cfg, fetcher, wash, bot).run(&[Token::new("A", "ethereum")]).await;
        assert!(outcomes[0].is_completed());
    }

    #[tokio::test]
    async fn absent_flows_abandon_only_that_token() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let fetcher = FakeFetcher {
            holders: HashMap::from([("A".to_string(), holders()), ("B".to_string(), holders())]),
            flows: HashMap::from([("A".to_string(), Vec::new()), ("B".to_string(), flows())]),
            ..Default::default()
        };
        let (wash, bot) = default_detectors(&cfg);
        let outcomes = pipeline(&cfg, fetcher, wash, bot).run(&cfg.token_list()).await;

        assert!(matches!(
            outcomes[0].status,
            TokenStatus::Abandoned { stage: Stage::FlowFetch, .. }
        ));
        assert!(outcomes[1].is_completed());
        assert!(!temp_flows_path(&cfg.processed_dir, &Token::new("A", "ethereum")).exists());
    }

    #[tokio::test]
    async fn wash_failure_is_isolated_to_the_token() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let fetcher = FakeFetcher {
            flows: HashMap::from([("A".to_string(), flows()), ("B".to_string(), flows())]),
            ..Default::default()
        };
        let bot = Box::new(ActivityBotDetector::new(cfg.window().unwrap()));
        let outcomes = pipeline(&cfg, fetcher, Box::new(FailingWash), bot)
            .run(&cfg.token_list())
            .await;

        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            assert!(matches!(
                outcome.status,
                TokenStatus::Abandoned { stage: Stage::WashTrading, .. }
            ));
            // the hand-off table was still written
            assert!(temp_flows_path(&cfg.processed_dir, &outcome.token).exists());
        }
        assert!(ArtifactStore::new(&cfg.output_dir).discover().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bot_failure_abandons_the_token() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let fetcher = FakeFetcher {
            flows: HashMap::from([("A".to_string(), flows())]),
            ..Default::default()
        };
        let outcomes = pipeline(&cfg, fetcher, Box::new(FlowTableWashDetector::new()), Box::new(FailingBot))
            .run(&[Token::new("A", "ethereum")])
            .await;
        assert!(matches!(
            outcomes[0].status,
            TokenStatus::Abandoned { stage: Stage::BotDetection, .. }
        ));
    }

    #[tokio::test]
    async fn completed_run_writes_discoverable_pair() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let fetcher = FakeFetcher {
            holders: HashMap::from([("A".to_string(), holders())]),
            flows: HashMap::from([("A".to_string(), flows())]),
            ..Default::default()
        };
        let (wash, bot) = default_detectors(&cfg);
        let outcomes = pipeline(&cfg, fetcher, wash, bot).run(&[Token::new("A", "ethereum")]).await;

        let TokenStatus::Completed { artifacts, .. } = &outcomes[0].status else {
            panic!("not completed: {:?}", outcomes[0].status);
        };
        let report = artifacts.report.as_ref().unwrap();
        let name = ArtifactName::parse(report.file_name().unwrap().to_str().unwrap()).unwrap();
        assert_eq!(name.token, "A");
        assert_eq!(name.timestamp, outcomes[0].timestamp);

        let store = ArtifactStore::new(&cfg.output_dir);
        let loaded = store.load("A", outcomes[0].timestamp);
        assert!(loaded.warnings.is_empty());
        let summary = loaded.summary.unwrap();
        assert_eq!(summary.distribution.total(), 3);
        assert!(summary.concentration_risk > 0.0);
        // 0xa and 0xb round-tripped within the hour
        let rows = loaded.rows.unwrap();
        let a = rows.iter().find(|r| r.wallet == "0xa").unwrap();
        assert!(a.wash_trading_flags.contains("round_trip"));
    }

    #[tokio::test]
    async fn holder_analysis_error_still_completes() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let calls = Arc::new(Mutex::new(Vec::new()));
        let fetcher = FakeFetcher {
            holders: HashMap::from([("A".to_string(), holders()), ("B".to_string(), holders())]),
            flows: HashMap::from([("A".to_string(), flows()), ("B".to_string(), flows())]),
            calls: Arc::clone(&calls),
        };
        let (wash, bot) = default_detectors(&cfg);
        let outcomes = Pipeline::new(&cfg, Box::new(fetcher), Box::new(FailingHolderAnalyzer), wash, bot)
            .unwrap()
            .run(&cfg.token_list())
            .await;

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["holders:A", "flows:A", "holders:B", "flows:B"]
        );
        for outcome in &outcomes {
            assert!(matches!(
                outcome.status,
                TokenStatus::Completed { holder_analysis: false, wallets: 3, .. }
            ));
        }
    }

    #[tokio::test]
    async fn unwritable_output_dir_abandons_each_token_at_scoring() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        // a regular file where the output directory should be
        std::fs::write(&cfg.output_dir, "").unwrap();
        let fetcher = FakeFetcher {
            holders: HashMap::from([("A".to_string(), holders()), ("B".to_string(), holders())]),
            flows: HashMap::from([("A".to_string(), flows()), ("B".to_string(), flows())]),
            ..Default::default()
        };
        let (wash, bot) = default_detectors(&cfg);
        let outcomes = pipeline(&cfg, fetcher, wash, bot).run(&cfg.token_list()).await;

        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            assert!(matches!(
                outcome.status,
                TokenStatus::Abandoned { stage: Stage::Scoring, .. }
            ));
        }
        assert!(cfg.output_dir.is_file());
    }

    #[tokio::test]
    async fn empty_wash_result_abandons_the_token() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let fetcher = FakeFetcher {
            flows: HashMap::from([("A".to_string(), flows())]),
            ..Default::default()
        };
        let bot = Box::new(ActivityBotDetector::new(cfg.window().unwrap()));
        let outcomes = pipeline(&cfg, fetcher, Box::new(SilentWash), bot)
            .run(&[Token::new("A", "ethereum")])
            .await;
        assert!(matches!(
            outcomes[0].status,
            TokenStatus::Abandoned { stage: Stage::WashTrading, .. }
        ));
    }
}
