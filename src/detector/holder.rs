use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::HOLDER_DEEP_DIVE_COUNT;
use crate::detector::HolderAnalyzer;
use crate::error::Result;
use crate::fetcher::DataFetcher;
use crate::types::{Holder, HolderAnalysis, Token};

/// Weights of the two concentration measures in `concentration_risk`.
const TOP10_WEIGHT: f64 = 0.6;
const GINI_WEIGHT: f64 = 0.4;

/// Holder-concentration analyzer. Largest holders are looked up through the
/// fetcher and pools/exchanges are dropped before measuring concentration.
pub struct ConcentrationAnalyzer {
    deep_dive_count: usize,
}

impl ConcentrationAnalyzer {
    pub fn new() -> Self {
        Self {
            deep_dive_count: HOLDER_DEEP_DIVE_COUNT,
        }
    }
}

impl Default for ConcentrationAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HolderAnalyzer for ConcentrationAnalyzer {
    async fn analyze(
        &self,
        token: &Token,
        holders: &[Holder],
        fetcher: &dyn DataFetcher,
    ) -> Result<Option<HolderAnalysis>> {
        let mut ranked: Vec<&Holder> = holders.iter().filter(|h| h.balance > 0.0).collect();
        ranked.sort_by(|a, b| b.balance.total_cmp(&a.balance));

        let mut kept: Vec<f64> = Vec::with_capacity(ranked.len());
        let mut excluded = 0usize;
        for (rank, holder) in ranked.iter().enumerate() {
            if rank < self.deep_dive_count {
                match fetcher.lookup_entity(&holder.address, &token.chain).await {
                    Ok(Some(entity)) if entity.is_infrastructure() => {
                        info!(
                            token = %token,
                            address = %holder.address,
                            entity = entity.name.as_deref().unwrap_or("?"),
                            "Excluding infrastructure holder from concentration"
                        );
                        excluded += 1;
                        continue;
                    }
                    Ok(_) => {}
                    // The lookup only refines the result; keep the holder.
                    Err(e) => warn!(token = %token, address = %holder.address, "Holder deep-dive lookup failed: {e}"),
                }
            }
            kept.push(holder.balance);
        }

        if kept.is_empty() {
            warn!(
                token = %token,
                excluded,
                "No holders with positive balance left after infrastructure exclusion"
            );
            return Ok(None);
        }

        let analysis = measure_concentration(&kept, excluded);
        info!(
            token = %token,
            top10_share = analysis.top10_share,
            hhi = analysis.hhi,
            gini = analysis.gini,
            concentration_risk = analysis.concentration_risk,
            "Holder analysis: top10 {:.1}% | HHI {:.3} | Gini {:.3} | risk {:.1}",
            analysis.top10_share, analysis.hhi, analysis.gini, analysis.concentration_risk,
        );
        Ok(Some(analysis))
    }
}

/// Concentration measures over balances sorted descending. Balances must be
/// positive and non-empty.
pub fn measure_concentration(balances_desc: &[f64], infrastructure_excluded: usize) -> HolderAnalysis {
    let total: f64 = balances_desc.iter().sum();
    let shares: Vec<f64> = balances_desc.iter().map(|b| b / total).collect();

    let top10_share = shares.iter().take(10).sum::<f64>() * 100.0;
    let hhi = shares.iter().map(|s| s * s).sum::<f64>();

    // Gini over ascending balances with 1-based ranks.
    let n = balances_desc.len() as f64;
    let weighted: f64 = balances_desc
        .iter()
        .rev()
        .enumerate()
        .map(|(i, b)| (i as f64 + 1.0) * b)
        .sum();
    let gini = ((2.0 * weighted) / (n * total) - (n + 1.0) / n).clamp(0.0, 1.0);

    let concentration_risk = (TOP10_WEIGHT * top10_share + GINI_WEIGHT * gini * 100.0).clamp(0.0, 100.0);

    HolderAnalysis {
        holders_considered: balances_desc.len(),
        infrastructure_excluded,
        top10_share: top10_share.clamp(0.0, 100.0),
        hhi,
        gini,
        concentration_risk,
    }
}
