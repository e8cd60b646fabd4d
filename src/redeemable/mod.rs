use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::db::market_repo;
use crate::models::OnChainPosition;

const CACHE_TTL: Duration = Duration::from_secs(300);
const REDEMPTION_FEE_RATE: &str = "0.01";

#[derive(Debug, Clone)]
pub struct RedeemableWinning {
    pub condition_id: String,
    pub net_value: Decimal,
    pub pnl: Decimal,
    pub pnl_pct: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct RedeemableReport {
    pub winning: Vec<RedeemableWinning>,
    pub losing: Vec<String>,
}

/// 5-minute TTL cache keyed by `(user_id, wallet_address)`, same in-process
/// shape as [`crate::db::market_repo::ExistingIdsCache`] — invalidated
/// explicitly by callers on any TP/SL trigger or user trade.
#[derive(Default)]
pub struct RedeemableCache {
    inner: RwLock<HashMap<(String, String), (Instant, RedeemableReport)>>,
}

impl RedeemableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn invalidate(&self, user_id: &str, wallet_address: &str) {
        self.inner
            .write()
            .await
            .remove(&(user_id.to_string(), wallet_address.to_string()));
    }

    pub async fn invalidate_all(&self) {
        self.inner.write().await.clear();
    }
}

/// Classify on-chain positions against resolved-market state per §4.8:
/// winning positions net a 1% redemption fee; losing positions contribute
/// zero value but are still surfaced so the caller can close the DB row.
pub async fn scan_redeemable(
    pool: &PgPool,
    user_id: &str,
    wallet_address: &str,
    positions: &[OnChainPosition],
    cache: &RedeemableCache,
) -> anyhow::Result<RedeemableReport> {
    let key = (user_id.to_string(), wallet_address.to_string());
    {
        let guard = cache.inner.read().await;
        if let Some((fetched_at, report)) = guard.get(&key) {
            if fetched_at.elapsed() < CACHE_TTL {
                return Ok(report.clone());
            }
        }
    }

    let fee_rate = Decimal::from_str(REDEMPTION_FEE_RATE).unwrap();
    let mut report = RedeemableReport::default();

    for pos in positions {
        let Some(market) = market_repo::get_market_by_condition_id(pool, &pos.condition_id).await? else {
            continue;
        };
        if !market.is_resolved() {
            continue;
        }

        match market.winning_outcome {
            Some(winner) if winner == pos.outcome_index => {
                let net_value = pos.tokens_held * (Decimal::ONE - fee_rate);
                let cost_basis = pos.tokens_held * pos.avg_price;
                let pnl = net_value - cost_basis;
                let pnl_pct = if cost_basis.is_zero() {
                    Decimal::ZERO
                } else {
                    pnl / cost_basis * Decimal::from(100)
                };
                report.winning.push(RedeemableWinning {
                    condition_id: pos.condition_id.clone(),
                    net_value,
                    pnl,
                    pnl_pct,
                });
            }
            _ => report.losing.push(pos.condition_id.clone()),
        }
    }

    cache.inner.write().await.insert(key, (Instant::now(), report.clone()));
    Ok(report)
}
