pub mod raw;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::models::{
    EventDescriptor, MarketStatus, NormalizedMarket, RawMarket, ResolutionStatus, TokenDescriptor,
};

/// Numeric columns are clamped to `[0, 99999999.9999]` before write.
const NUMERIC_CAP: &str = "99999999.9999";

pub fn cap(v: Decimal) -> Decimal {
    let max = Decimal::from_str(NUMERIC_CAP).unwrap();
    v.clamp(Decimal::ZERO, max).round_dp(4)
}

fn parse_decimal(s: &Option<String>) -> Decimal {
    s.as_deref()
        .and_then(|v| Decimal::from_str(v).ok())
        .unwrap_or(Decimal::ZERO)
}

fn parse_decimal_opt(s: &Option<String>) -> Option<Decimal> {
    s.as_deref().and_then(|v| Decimal::from_str(v).ok())
}

/// Outcome-extraction / lifecycle classification, priority order per §4.3:
/// 1. explicit `outcome` field
/// 2. UMA "resolved" + extreme prices
/// 3. extreme prices alone
/// 4. otherwise: derived from timestamps / closed flag
pub fn classify_resolution(
    prices: &[Decimal],
    end_date: Option<DateTime<Utc>>,
    explicit_outcome: Option<&str>,
    uma_status: Option<&str>,
    closed: bool,
    now: DateTime<Utc>,
) -> (MarketStatus, ResolutionStatus, Option<i32>) {
    if let Some(outcome) = explicit_outcome {
        if let Some(idx) = winner_from_explicit_outcome(outcome) {
            return (MarketStatus::Closed, ResolutionStatus::Resolved, Some(idx));
        }
    }

    let extreme = extreme_winner(prices);

    if uma_status.map(|s| s.eq_ignore_ascii_case("resolved")).unwrap_or(false) {
        if let Some(idx) = extreme {
            return (MarketStatus::Closed, ResolutionStatus::Resolved, Some(idx));
        }
    }

    if let Some(idx) = extreme {
        return (MarketStatus::Closed, ResolutionStatus::Resolved, Some(idx));
    }

    // Not resolvable yet — derive from timestamps / closed flag. Pass 3's SQL
    // sweep (§4.4) is the immediate ACTIVE→CLOSED safety net; this path
    // mirrors §3.3's PENDING→PROPOSED prose rule (expired over an hour ago)
    // for markets the Normalizer re-classifies directly during Pass 1/2/4.
    let expired_over_an_hour = end_date.map(|d| d + Duration::hours(1) < now).unwrap_or(false);
    if closed || expired_over_an_hour {
        return (MarketStatus::Closed, ResolutionStatus::Proposed, None);
    }

    (MarketStatus::Active, ResolutionStatus::Pending, None)
}

fn winner_from_explicit_outcome(outcome: &str) -> Option<i32> {
    match outcome.to_ascii_lowercase().as_str() {
        "yes" | "1" | "true" | "up" => Some(0),
        "no" | "0" | "false" | "down" => Some(1),
        _ => None,
    }
}

/// One outcome ≥ 0.99 and another ≤ 0.01 → that outcome wins.
fn extreme_winner(prices: &[Decimal]) -> Option<i32> {
    if prices.len() < 2 {
        return None;
    }
    let hi = Decimal::new(99, 2);
    let lo = Decimal::new(1, 2);
    for (i, p) in prices.iter().enumerate() {
        if *p >= hi {
            let rest_low = prices
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .all(|(_, q)| *q <= lo);
            if rest_low {
                return Some(i as i32);
            }
        }
    }
    None
}

pub fn build_polymarket_url(event_slug: Option<&str>, market_slug: Option<&str>) -> String {
    if let Some(slug) = event_slug {
        format!("https://polymarket.com/event/{slug}")
    } else {
        format!(
            "https://polymarket.com/market/{}",
            market_slug.unwrap_or_default()
        )
    }
}

/// Convert a raw upstream payload into a canonical [`NormalizedMarket`].
/// The Store's preservation rule (not this function) is responsible for
/// not overwriting non-empty stored fields with the empty lists this
/// produces when upstream omits them.
pub fn normalize_market(raw: RawMarket, now: DateTime<Utc>) -> NormalizedMarket {
    let outcomes = raw.outcomes.canonicalize();
    let outcome_prices: Vec<Decimal> = raw
        .outcome_prices
        .canonicalize()
        .into_iter()
        .map(|s| Decimal::from_str(&s).unwrap_or(Decimal::ZERO))
        .map(cap)
        .collect();
    let clob_token_ids = raw.clob_token_ids.canonicalize();
    let tokens: Vec<TokenDescriptor> = raw.tokens.canonicalize();
    let events: Vec<EventDescriptor> = raw.events.canonicalize();

    let event_slug = events.first().and_then(|e| e.event_slug.as_deref());
    let polymarket_url = build_polymarket_url(event_slug, raw.slug.as_deref());

    let (status, resolution_status, winning_outcome) = classify_resolution(
        &outcome_prices,
        raw.end_date,
        raw.outcome.as_deref(),
        raw.uma_resolution_status.as_deref(),
        raw.closed.unwrap_or(false),
        now,
    );

    let tradeable = status == MarketStatus::Active;
    let accepting_orders = tradeable && raw.accepting_orders.unwrap_or(tradeable);

    NormalizedMarket {
        market_id: raw.market_id,
        condition_id: raw.condition_id,
        slug: raw.slug,
        title: raw.title,
        description: raw.description,
        category: raw.category,
        market_type: raw.market_type,
        restricted: raw.restricted.unwrap_or(false),

        status,
        accepting_orders,
        archived: raw.archived.unwrap_or(false),
        tradeable,

        outcomes,
        outcome_prices,
        clob_token_ids,
        tokens,
        events,

        volume: cap(parse_decimal(&raw.volume)),
        volume_24hr: cap(parse_decimal(&raw.volume_24hr)),
        volume_1wk: cap(parse_decimal(&raw.volume_1wk)),
        volume_1mo: cap(parse_decimal(&raw.volume_1mo)),
        liquidity: cap(parse_decimal(&raw.liquidity)),
        spread: cap(parse_decimal(&raw.spread)),
        last_mid: None,
        price_change_1h: parse_decimal_opt(&raw.price_change_1h).map(cap),
        price_change_1d: parse_decimal_opt(&raw.price_change_1d).map(cap),
        price_change_1w: parse_decimal_opt(&raw.price_change_1w).map(cap),

        created_at: raw.created_at,
        updated_at: raw.updated_at,
        end_date: raw.end_date,
        resolution_date: if resolution_status == ResolutionStatus::Resolved {
            Some(now)
        } else {
            None
        },

        resolution_status,
        winning_outcome,
        polymarket_url,
    }
}

/// OPT-5 filter: markets with no activity and not ACTIVE are dropped before
/// upsert on most call sites. Bypassed explicitly for the closed-markets
/// lifecycle pass via `skip_lifecycle_filter`.
pub fn passes_activity_filter(m: &NormalizedMarket) -> bool {
    m.status == MarketStatus::Active || m.volume > Decimal::ZERO || m.volume_24hr > Decimal::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn cap_clamps_and_rounds() {
        assert_eq!(cap(dec("-5")), Decimal::ZERO);
        assert_eq!(cap(dec("999999999999.123456")), dec("99999999.9999"));
        assert_eq!(cap(dec("1.23455")), dec("1.2346"));
    }

    #[test]
    fn p4_extreme_prices_resolve_past_market() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let past = now - Duration::hours(2);
        let (status, res, winner) =
            classify_resolution(&[dec("0.995"), dec("0.005")], Some(past), None, None, false, now);
        assert_eq!(status, MarketStatus::Closed);
        assert_eq!(res, ResolutionStatus::Resolved);
        assert_eq!(winner, Some(0));
    }

    #[test]
    fn p5_mid_prices_future_market_is_active_pending() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let future = now + Duration::days(3);
        let (status, res, winner) =
            classify_resolution(&[dec("0.4"), dec("0.6")], Some(future), None, None, false, now);
        assert_eq!(status, MarketStatus::Active);
        assert_eq!(res, ResolutionStatus::Pending);
        assert_eq!(winner, None);
    }

    #[test]
    fn explicit_outcome_wins_over_prices() {
        let now = Utc::now();
        let (status, res, winner) = classify_resolution(
            &[dec("0.4"), dec("0.6")],
            Some(now - Duration::hours(1)),
            Some("Yes"),
            None,
            true,
            now,
        );
        assert_eq!(status, MarketStatus::Closed);
        assert_eq!(res, ResolutionStatus::Resolved);
        assert_eq!(winner, Some(0));
    }

    #[test]
    fn expired_unresolved_becomes_proposed() {
        let now = Utc::now();
        let (status, res, winner) = classify_resolution(
            &[dec("0.4"), dec("0.6")],
            Some(now - Duration::hours(2)),
            None,
            None,
            false,
            now,
        );
        assert_eq!(status, MarketStatus::Closed);
        assert_eq!(res, ResolutionStatus::Proposed);
        assert_eq!(winner, None);
    }

    #[test]
    fn url_prefers_event_slug() {
        assert_eq!(
            build_polymarket_url(Some("foo-event"), Some("bar-market")),
            "https://polymarket.com/event/foo-event"
        );
        assert_eq!(
            build_polymarket_url(None, Some("bar-market")),
            "https://polymarket.com/market/bar-market"
        );
    }
}
