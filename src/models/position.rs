use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

/// A market with at least one active user position — owned by the external
/// trading layer, used here to prioritize polling and drive WS subscriptions.
#[derive(Debug, Clone, FromRow)]
pub struct WatchedMarket {
    pub market_id: String,
    pub condition_id: Option<String>,
    pub title: Option<String>,
    pub active_positions: i32,
    pub last_position_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// A user's open position, owned by the external trading layer. The core
/// reads this to evaluate TP/SL cancellation sweeps and tier construction.
#[derive(Debug, Clone, FromRow)]
pub struct UserPosition {
    pub market_id: String,
    pub outcome: String,
    pub token_count: Decimal,
    pub entry_price: Decimal,
}

/// An on-chain position supplied by the external wallet layer to the
/// Redeemable Detector.
#[derive(Debug, Clone)]
pub struct OnChainPosition {
    pub condition_id: String,
    pub outcome_index: i32,
    pub tokens_held: Decimal,
    pub avg_price: Decimal,
}
