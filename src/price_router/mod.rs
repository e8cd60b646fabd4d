use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;

use crate::db::market_repo;
use crate::models::{MarketStatus, WsFieldUpdate};

#[derive(Debug, Clone, Deserialize)]
pub struct PriceChange {
    pub asset_id: String,
    #[serde(default)]
    pub best_bid: Option<Decimal>,
    #[serde(default)]
    pub best_ask: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
}

impl PriceChange {
    fn computed_price(&self) -> Option<Decimal> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => self.price,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceChangeFrame {
    pub market: String,
    pub price_changes: Vec<PriceChange>,
}

fn is_yes(outcome: &str) -> bool {
    matches!(outcome.to_ascii_lowercase().as_str(), "yes" | "up")
}

fn is_no(outcome: &str) -> bool {
    matches!(outcome.to_ascii_lowercase().as_str(), "no" | "down")
}

/// Translate a `price_change` frame into per-outcome price writes. Never
/// derives `last_mid` here — that field is sourced only from orderbook
/// frames, never from the average of binary outcome prices (mathematically
/// vacuous: they sum to 1).
pub async fn handle_frame(pool: &PgPool, frame: PriceChangeFrame) -> anyhow::Result<()> {
    let Some(market) = market_repo::get_market_by_condition_id(pool, &frame.market).await? else {
        tracing::debug!(condition_id = %frame.market, "price_change for unknown market, dropping");
        return Ok(());
    };

    if market.status != MarketStatus::Active.as_str() {
        tracing::debug!(condition_id = %frame.market, "price_change for inactive market, dropping");
        return Ok(());
    }

    let token_ids = market.clob_token_ids();
    let mut outcome_prices = serde_json::Map::new();
    let mut yes_price: Option<Decimal> = None;
    let mut no_price: Option<Decimal> = None;

    for change in &frame.price_changes {
        let Some(idx) = token_ids.iter().position(|t| t == &change.asset_id) else {
            tracing::debug!(asset_id = %change.asset_id, "price_change for unknown token, skipping");
            continue;
        };
        let Some(price) = change.computed_price() else {
            continue;
        };
        let Some(outcome_name) = market.outcomes.get(idx) else {
            continue;
        };

        outcome_prices.insert(
            outcome_name.clone(),
            serde_json::Value::String(price.to_string()),
        );

        if is_yes(outcome_name) {
            yes_price = Some(price);
        } else if is_no(outcome_name) {
            no_price = Some(price);
        }
    }

    if outcome_prices.is_empty() {
        return Ok(());
    }

    market_repo::upsert_market_ws(
        pool,
        &market.market_id,
        WsFieldUpdate {
            last_yes_price: yes_price,
            last_no_price: no_price,
            outcome_prices: Some(outcome_prices),
            ..Default::default()
        },
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computed_price_prefers_bid_ask_midpoint() {
        let c = PriceChange {
            asset_id: "t".into(),
            best_bid: Some(Decimal::new(40, 2)),
            best_ask: Some(Decimal::new(60, 2)),
            price: Some(Decimal::new(1, 2)),
        };
        assert_eq!(c.computed_price(), Some(Decimal::new(50, 2)));
    }

    #[test]
    fn computed_price_falls_back_to_price() {
        let c = PriceChange {
            asset_id: "t".into(),
            best_bid: None,
            best_ask: Some(Decimal::new(60, 2)),
            price: Some(Decimal::new(55, 2)),
        };
        assert_eq!(c.computed_price(), Some(Decimal::new(55, 2)));
    }

    #[test]
    fn yes_no_classification_is_case_insensitive() {
        assert!(is_yes("Yes"));
        assert!(is_yes("UP"));
        assert!(is_no("no"));
        assert!(is_no("Down"));
        assert!(!is_yes("Team A"));
    }
}
