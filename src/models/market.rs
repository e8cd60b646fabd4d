use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::normalize::raw::RawList;

/// Trading status (`status` column): ACTIVE / CLOSED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketStatus {
    Active,
    Closed,
}

impl MarketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Active => "ACTIVE",
            MarketStatus::Closed => "CLOSED",
        }
    }
}

/// Resolution pipeline state: PENDING / PROPOSED / RESOLVED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ResolutionStatus {
    Pending,
    Proposed,
    Resolved,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStatus::Pending => "PENDING",
            ResolutionStatus::Proposed => "PROPOSED",
            ResolutionStatus::Resolved => "RESOLVED",
        }
    }
}

/// A richer token descriptor, parallel to `clob_token_ids`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TokenDescriptor {
    pub token_id: String,
    pub outcome: String,
    #[serde(default)]
    pub winner: Option<bool>,
}

/// An upstream event-descriptor record, preserved across upserts when
/// omitted by the standalone markets endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventDescriptor {
    #[serde(default, alias = "id")]
    pub event_id: Option<String>,
    #[serde(default, alias = "slug")]
    pub event_slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Raw payload shape shared by `/events[].markets[]` and `/markets`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMarket {
    #[serde(alias = "id")]
    pub market_id: String,
    #[serde(default, alias = "conditionId")]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(alias = "question")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "marketType")]
    pub market_type: Option<String>,
    #[serde(default)]
    pub restricted: Option<bool>,

    #[serde(default)]
    pub outcomes: RawList<String>,
    #[serde(default, alias = "outcomePrices")]
    pub outcome_prices: RawList<String>,
    #[serde(default, alias = "clobTokenIds")]
    pub clob_token_ids: RawList<String>,
    #[serde(default)]
    pub tokens: RawList<TokenDescriptor>,
    #[serde(default)]
    pub events: RawList<EventDescriptor>,

    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(default, alias = "acceptingOrders")]
    pub accepting_orders: Option<bool>,
    #[serde(default)]
    pub archived: Option<bool>,

    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default, alias = "volume24hr")]
    pub volume_24hr: Option<String>,
    #[serde(default, alias = "volume1wk")]
    pub volume_1wk: Option<String>,
    #[serde(default, alias = "volume1mo")]
    pub volume_1mo: Option<String>,
    #[serde(default)]
    pub liquidity: Option<String>,
    #[serde(default)]
    pub spread: Option<String>,
    #[serde(default, alias = "oneHourPriceChange")]
    pub price_change_1h: Option<String>,
    #[serde(default, alias = "oneDayPriceChange")]
    pub price_change_1d: Option<String>,
    #[serde(default, alias = "oneWeekPriceChange")]
    pub price_change_1w: Option<String>,

    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "endDate")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, alias = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Explicit resolved-outcome field, when upstream provides one.
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default, alias = "umaResolutionStatuses")]
    pub uma_resolution_status: Option<String>,
}

/// `/events` endpoint wrapper: an event groups a list of markets.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub id: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub markets: Vec<RawMarket>,
}

/// Canonical, normalized market ready for the Store.
#[derive(Debug, Clone)]
pub struct NormalizedMarket {
    pub market_id: String,
    pub condition_id: Option<String>,
    pub slug: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub market_type: Option<String>,
    pub restricted: bool,

    pub status: MarketStatus,
    pub accepting_orders: bool,
    pub archived: bool,
    pub tradeable: bool,

    pub outcomes: Vec<String>,
    pub outcome_prices: Vec<Decimal>,
    pub clob_token_ids: Vec<String>,
    pub tokens: Vec<TokenDescriptor>,
    pub events: Vec<EventDescriptor>,

    pub volume: Decimal,
    pub volume_24hr: Decimal,
    pub volume_1wk: Decimal,
    pub volume_1mo: Decimal,
    pub liquidity: Decimal,
    pub spread: Decimal,
    pub last_mid: Option<Decimal>,
    pub price_change_1h: Option<Decimal>,
    pub price_change_1d: Option<Decimal>,
    pub price_change_1w: Option<Decimal>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub resolution_date: Option<DateTime<Utc>>,

    pub resolution_status: ResolutionStatus,
    pub winning_outcome: Option<i32>,
    pub polymarket_url: String,
}

/// Row shape of the `markets_poll` table.
#[derive(Debug, Clone, FromRow)]
pub struct MarketRow {
    pub market_id: String,
    pub condition_id: Option<String>,
    pub slug: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: String,
    pub accepting_orders: bool,
    pub archived: bool,
    pub tradeable: bool,
    pub outcomes: Vec<String>,
    pub outcome_prices: Vec<Decimal>,
    pub last_mid: Option<Decimal>,
    pub volume: Decimal,
    pub volume_24hr: Decimal,
    pub volume_1wk: Decimal,
    pub volume_1mo: Decimal,
    pub liquidity: Decimal,
    pub spread: Decimal,
    pub created_at: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub resolution_date: Option<DateTime<Utc>>,
    pub price_change_1h: Option<Decimal>,
    pub price_change_1d: Option<Decimal>,
    pub price_change_1w: Option<Decimal>,
    pub clob_token_ids: Option<Json<Vec<String>>>,
    pub tokens: Option<Json<Vec<TokenDescriptor>>>,
    pub events: Option<Json<Vec<EventDescriptor>>>,
    pub market_type: Option<String>,
    pub restricted: bool,
    pub resolution_status: String,
    pub winning_outcome: Option<i32>,
    pub polymarket_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl MarketRow {
    pub fn clob_token_ids(&self) -> Vec<String> {
        self.clob_token_ids.as_ref().map(|j| j.0.clone()).unwrap_or_default()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution_status == ResolutionStatus::Resolved.as_str()
    }

    pub fn is_closed(&self) -> bool {
        self.status == MarketStatus::Closed.as_str()
    }
}

/// Row shape of the `markets_ws` table: WS-delivered fields only.
#[derive(Debug, Clone, FromRow, Default)]
pub struct MarketWsRow {
    pub market_id: String,
    pub last_bb: Option<Decimal>,
    pub last_ba: Option<Decimal>,
    pub last_mid: Option<Decimal>,
    pub last_trade_price: Option<Decimal>,
    pub last_yes_price: Option<Decimal>,
    pub last_no_price: Option<Decimal>,
    pub outcome_prices: Option<Json<serde_json::Map<String, serde_json::Value>>>,
    pub updated_at: DateTime<Utc>,
}

/// Sparse set of WS-delivered fields to merge into `markets_ws`. Only the
/// `Some` fields are written; absent fields leave the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct WsFieldUpdate {
    pub last_bb: Option<Decimal>,
    pub last_ba: Option<Decimal>,
    pub last_mid: Option<Decimal>,
    pub last_trade_price: Option<Decimal>,
    pub last_yes_price: Option<Decimal>,
    pub last_no_price: Option<Decimal>,
    pub outcome_prices: Option<serde_json::Map<String, serde_json::Value>>,
}

impl WsFieldUpdate {
    pub fn is_empty(&self) -> bool {
        self.last_bb.is_none()
            && self.last_ba.is_none()
            && self.last_mid.is_none()
            && self.last_trade_price.is_none()
            && self.last_yes_price.is_none()
            && self.last_no_price.is_none()
            && self.outcome_prices.is_none()
    }
}
