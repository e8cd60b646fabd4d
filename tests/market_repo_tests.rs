mod common;

use chrono::Utc;
use rust_decimal::Decimal;

use ingestor::db::market_repo;
use ingestor::models::{EventDescriptor, MarketStatus, NormalizedMarket, ResolutionStatus};

fn base_market(market_id: &str, volume: Decimal) -> NormalizedMarket {
    NormalizedMarket {
        market_id: market_id.into(),
        condition_id: Some(format!("cond_{market_id}")),
        slug: Some("test-market".into()),
        title: "Will this test pass?".into(),
        description: None,
        category: Some("testing".into()),
        market_type: None,
        restricted: false,

        status: MarketStatus::Active,
        accepting_orders: true,
        archived: false,
        tradeable: true,

        outcomes: vec!["Yes".into(), "No".into()],
        outcome_prices: vec![Decimal::new(6, 1), Decimal::new(4, 1)],
        clob_token_ids: vec!["tok_a".into(), "tok_b".into()],
        tokens: vec![],
        events: vec![EventDescriptor {
            event_id: Some("evt_1".into()),
            event_slug: Some("evt-slug".into()),
            title: Some("Test Event".into()),
        }],

        volume,
        volume_24hr: Decimal::ZERO,
        volume_1wk: Decimal::ZERO,
        volume_1mo: Decimal::ZERO,
        liquidity: Decimal::ZERO,
        spread: Decimal::ZERO,
        last_mid: None,
        price_change_1h: None,
        price_change_1d: None,
        price_change_1w: None,

        created_at: Some(Utc::now()),
        updated_at: Some(Utc::now()),
        end_date: Some(Utc::now() + chrono::Duration::days(7)),
        resolution_date: None,

        resolution_status: ResolutionStatus::Pending,
        winning_outcome: None,
        polymarket_url: "https://polymarket.com/event/evt-slug".into(),
    }
}

#[tokio::test]
async fn upsert_then_reupsert_preserves_events_and_category_when_upstream_omits_them() {
    let pool = common::setup_test_db().await;

    let first = base_market("market_preserve_1", Decimal::from(1000));
    market_repo::upsert_markets(&pool, &[first], false)
        .await
        .expect("initial upsert should succeed");

    let stored = market_repo::get_market_by_id(&pool, "market_preserve_1")
        .await
        .expect("query should succeed")
        .expect("row should exist");
    assert_eq!(stored.category.as_deref(), Some("testing"));
    assert!(!stored.clob_token_ids().is_empty());

    // A later standalone-markets fetch that omits category/events/tokens
    // must not blank out what's already stored.
    let mut second = base_market("market_preserve_1", Decimal::from(1500));
    second.category = None;
    second.events = vec![];
    second.clob_token_ids = vec![];

    market_repo::upsert_markets(&pool, &[second], false)
        .await
        .expect("second upsert should succeed");

    let stored = market_repo::get_market_by_id(&pool, "market_preserve_1")
        .await
        .expect("query should succeed")
        .expect("row should still exist");
    assert_eq!(stored.category.as_deref(), Some("testing"));
    assert_eq!(stored.volume, Decimal::from(1500));
}

#[tokio::test]
async fn upsert_drops_inactive_zero_volume_markets_under_opt5() {
    let pool = common::setup_test_db().await;

    let mut dead = base_market("market_opt5_dead", Decimal::ZERO);
    dead.status = MarketStatus::Closed;
    dead.tradeable = false;

    let written = market_repo::upsert_markets(&pool, &[dead], false)
        .await
        .expect("upsert should not error even when everything is filtered");
    assert_eq!(written, 0);

    let stored = market_repo::get_market_by_id(&pool, "market_opt5_dead")
        .await
        .expect("query should succeed");
    assert!(stored.is_none(), "OPT-5 filter should have dropped this row entirely");
}

#[tokio::test]
async fn upsert_keeps_inactive_market_with_nonzero_volume() {
    let pool = common::setup_test_db().await;

    let mut closed_but_traded = base_market("market_opt5_survivor", Decimal::from(42));
    closed_but_traded.status = MarketStatus::Closed;
    closed_but_traded.tradeable = false;

    let written = market_repo::upsert_markets(&pool, &[closed_but_traded], false)
        .await
        .expect("upsert should succeed");
    assert_eq!(written, 1);

    let stored = market_repo::get_market_by_id(&pool, "market_opt5_survivor")
        .await
        .expect("query should succeed");
    assert!(stored.is_some());
}
