use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TpslStatus {
    Active,
    Triggered,
    Cancelled,
}

impl TpslStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TpslStatus::Active => "ACTIVE",
            TpslStatus::Triggered => "TRIGGERED",
            TpslStatus::Cancelled => "CANCELLED",
        }
    }
}

/// A user-configured take-profit / stop-loss rule, owned by the external
/// trading layer; the core reads and updates status/trigger fields only.
#[derive(Debug, Clone, FromRow)]
pub struct TpslOrder {
    pub id: Uuid,
    pub user_id: String,
    pub market_id: String,
    pub token_id: String,
    pub outcome: String,
    pub entry_price: Decimal,
    pub take_profit_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub monitored_tokens: Decimal,
    pub status: String,
    pub triggered_type: Option<String>,
    pub execution_price: Option<Decimal>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TpslOrder {
    pub fn is_active(&self) -> bool {
        self.status == TpslStatus::Active.as_str()
    }
}
