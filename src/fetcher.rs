use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::config::{Config, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::{EntityInfo, Holder, TimeWindow, Token, UserFlow};

/// Page size for `/transfers`.
const TRANSFER_PAGE_SIZE: usize = 500;
/// Hard cap on transfers pulled for one token.
const MAX_TRANSFERS: usize = 5_000;

/// Source of raw on-chain data. Empty vectors mean "nothing found"; errors mean
/// the source itself failed.
#[async_trait]
pub trait DataFetcher: Send + Sync {
    async fn fetch_token_holders(&self, token: &Token) -> Result<Vec<Holder>>;

    async fn fetch_transfer_flows(&self, token: &Token, window: TimeWindow) -> Result<Vec<UserFlow>>;

    /// Entity attribution for one address. `Ok(None)` when the address is unknown.
    async fn lookup_entity(&self, address: &str, chain: &str) -> Result<Option<EntityInfo>>;
}

/// Live fetcher over the Arkham Intelligence REST API.
pub struct ArkhamFetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ArkhamFetcher {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.arkham_api_url.trim_end_matches('/').to_string(),
            api_key: cfg.arkham_api_key.clone(),
        })
    }

    /// GET a JSON document. `Ok(None)` on 404, error on any other non-success status.
    async fn get_json(&self, url: &str) -> Result<Option<serde_json::Value>> {
        let resp = self
            .client
            .get(url)
            .header("API-Key", &self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body_short: String = body.chars().take(200).collect();
            return Err(AppError::Api(format!("{status} from {url}: {body_short}")));
        }
        Ok(Some(resp.json().await?))
    }
}

#[async_trait]
impl DataFetcher for ArkhamFetcher {
    async fn fetch_token_holders(&self, token: &Token) -> Result<Vec<Holder>> {
        let url = format!("{}/token/holders/{}/{}", self.base_url, token.chain, token.address);
        let Some(resp) = self.get_json(&url).await? else {
            return Ok(Vec::new());
        };
        let holders = parse_holders(&resp, &token.chain);
        info!(token = %token, holders = holders.len(), "Fetched holder snapshot");
        Ok(holders)
    }

    async fn fetch_transfer_flows(&self, token: &Token, window: TimeWindow) -> Result<Vec<UserFlow>> {
        let mut flows = Vec::new();
        let mut offset = 0usize;

        loop {
            let url = format!(
                "{}/transfers?tokens={}&chains={}&timeLast={}&limit={}&offset={}",
                self.base_url,
                token.address,
                token.chain,
                window.as_query(),
                TRANSFER_PAGE_SIZE,
                offset
            );
            let Some(resp) = self.get_json(&url).await? else {
                break;
            };
            let (page, raw_count) = parse_transfers(&resp);
            if raw_count > page.len() {
                debug!(token = %token, skipped = raw_count - page.len(), "Skipped malformed transfers");
            }
            flows.extend(page);

            if raw_count < TRANSFER_PAGE_SIZE || flows.len() >= MAX_TRANSFERS {
                break;
            }
            offset += TRANSFER_PAGE_SIZE;
        }

        flows.truncate(MAX_TRANSFERS);
        info!(token = %token, flows = flows.len(), window = %window.as_query(), "Fetched transfer flows");
        Ok(flows)
    }

    async fn lookup_entity(&self, address: &str, chain: &str) -> Result<Option<EntityInfo>> {
        let url = format!("{}/intelligence/address/{}?chain={}", self.base_url, address, chain);
        match self.get_json(&url).await {
            Ok(Some(v)) => Ok(parse_entity(&v)),
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(address, "Entity lookup failed: {e}");
                Err(e)
            }
        }
    }
}

/// Read a number that Arkham sometimes sends as a string.
fn as_f64_lenient(v: &serde_json::Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

/// Address fields are either a bare string or `{ "address": "..." }`.
fn address_of(v: &serde_json::Value) -> Option<String> {
    v.as_str()
        .or_else(|| v.get("address").and_then(|a| a.as_str()))
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}

/// Parse `/token/holders` into holders. Accepts the per-chain map
/// (`addressTopHolders.<chain>`), a flat `holders` array, or a bare array.
pub fn parse_holders(v: &serde_json::Value, chain: &str) -> Vec<Holder> {
    let items = v
        .get("addressTopHolders")
        .and_then(|m| m.get(chain))
        .and_then(|a| a.as_array())
        .or_else(|| v.get("holders").and_then(|a| a.as_array()))
        .or_else(|| v.as_array());

    let Some(items) = items else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let address = address_of(item.get("address")?)?;
            let balance = item.get("balance").and_then(as_f64_lenient)?;
            let usd_value = item.get("usd").and_then(as_f64_lenient);
            Some(Holder { address, balance, usd_value })
        })
        .collect()
}

/// Parse a `/transfers` page into user flows.
/// Returns `(flows, raw_count)` so callers can paginate on the raw page size.
pub fn parse_transfers(v: &serde_json::Value) -> (Vec<UserFlow>, usize) {
    let Some(items) = v.get("transfers").and_then(|a| a.as_array()) else {
        return (Vec::new(), 0);
    };

    let flows = items
        .iter()
        .filter_map(|item| {
            let from_address = address_of(item.get("fromAddress")?)?;
            let to_address = address_of(item.get("toAddress")?)?;
            let amount = item.get("unitValue").and_then(as_f64_lenient)?;
            let usd_value = item.get("historicalUSD").and_then(as_f64_lenient).unwrap_or(0.0);
            let timestamp = item
                .get("blockTimestamp")
                .and_then(|t| t.as_str())
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.timestamp())?;
            let tx_hash = item
                .get("transactionHash")
                .and_then(|h| h.as_str())
                .unwrap_or("")
                .to_string();
            Some(UserFlow { from_address, to_address, amount, usd_value, timestamp, tx_hash })
        })
        .collect();

    (flows, items.len())
}

/// Parse `/intelligence/address` into entity info. None when the address has
/// neither an entity nor a label.
pub fn parse_entity(v: &serde_json::Value) -> Option<EntityInfo> {
    let entity = v.get("arkhamEntity");
    let label = v.get("arkhamLabel");

    let name = entity
        .and_then(|e| e.get("name"))
        .or_else(|| label.and_then(|l| l.get("name")))
        .and_then(|n| n.as_str())
        .map(|s| s.to_string());
    let kind = entity
        .and_then(|e| e.get("type"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string());

    if name.is_none() && kind.is_none() {
        None
    } else {
        Some(EntityInfo { name, kind })
    }
}
