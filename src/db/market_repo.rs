use std::collections::HashSet;
use std::time::{Duration, Instant};

use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio::sync::RwLock;

use crate::models::{MarketRow, NormalizedMarket, WsFieldUpdate};
use crate::normalize::passes_activity_filter;

const EXISTING_IDS_TTL: Duration = Duration::from_secs(300);
const UPSERT_BATCH_SIZE: usize = 500;

/// 5-minute TTL cache for [`get_existing_market_ids`], in-process — no Redis
/// dependency appears anywhere in the example pack, so this stays local
/// rather than pulling in a cache server.
#[derive(Default)]
pub struct ExistingIdsCache {
    inner: RwLock<Option<(Instant, HashSet<String>)>>,
}

impl ExistingIdsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn invalidate(&self) {
        *self.inner.write().await = None;
    }
}

/// Batch-upsert normalized markets into `markets_poll`. Returns the number of
/// rows written. The preservation rule (clob_token_ids/tokens/events/category)
/// and the OPT-5 drop filter are applied exactly as in the source's
/// `upsert_markets_poll`.
pub async fn upsert_markets(
    pool: &PgPool,
    rows: &[NormalizedMarket],
    skip_lifecycle_filter: bool,
) -> anyhow::Result<u64> {
    let filtered: Vec<&NormalizedMarket> = if skip_lifecycle_filter {
        rows.iter().collect()
    } else {
        rows.iter().filter(|m| passes_activity_filter(m)).collect()
    };

    if filtered.is_empty() {
        return Ok(0);
    }

    let mut written = 0u64;
    for chunk in filtered.chunks(UPSERT_BATCH_SIZE) {
        match upsert_batch(pool, chunk).await {
            Ok(n) => written += n,
            Err(e) => {
                tracing::warn!(error = %e, "batch upsert failed, retrying row by row");
                for market in chunk {
                    match upsert_batch(pool, std::slice::from_ref(market)).await {
                        Ok(n) => written += n,
                        Err(e) => tracing::error!(
                            error = %e,
                            market_id = %market.market_id,
                            "failed to upsert market, skipping"
                        ),
                    }
                }
            }
        }
        if filtered.len() > UPSERT_BATCH_SIZE {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    Ok(written)
}

async fn upsert_batch(pool: &PgPool, markets: &[&NormalizedMarket]) -> anyhow::Result<u64> {
    let mut tx = pool.begin().await?;
    let mut count = 0u64;

    for m in markets {
        sqlx::query(
            r#"
            INSERT INTO markets_poll
                (market_id, condition_id, slug, title, description, category,
                 status, accepting_orders, archived, tradeable,
                 outcomes, outcome_prices, last_mid,
                 volume, volume_24hr, volume_1wk, volume_1mo, liquidity, spread,
                 created_at, end_date, resolution_date,
                 price_change_1h, price_change_1d, price_change_1w,
                 clob_token_ids, tokens, events, market_type, restricted,
                 resolution_status, winning_outcome, polymarket_url, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6,
                    $7, $8, $9, $10,
                    $11, $12, $13,
                    $14, $15, $16, $17, $18, $19,
                    $20, $21, $22,
                    $23, $24, $25,
                    $26, $27, $28, $29, $30,
                    $31, $32, $33, now())
            ON CONFLICT (market_id) DO UPDATE SET
                condition_id = EXCLUDED.condition_id,
                slug = EXCLUDED.slug,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                category = CASE
                    WHEN EXCLUDED.category IS NOT NULL AND EXCLUDED.category != '' THEN EXCLUDED.category
                    ELSE markets_poll.category
                END,
                status = EXCLUDED.status,
                accepting_orders = EXCLUDED.accepting_orders,
                archived = EXCLUDED.archived,
                tradeable = EXCLUDED.tradeable,
                outcomes = EXCLUDED.outcomes,
                outcome_prices = EXCLUDED.outcome_prices,
                last_mid = EXCLUDED.last_mid,
                volume = EXCLUDED.volume,
                volume_24hr = EXCLUDED.volume_24hr,
                volume_1wk = EXCLUDED.volume_1wk,
                volume_1mo = EXCLUDED.volume_1mo,
                liquidity = EXCLUDED.liquidity,
                spread = EXCLUDED.spread,
                created_at = EXCLUDED.created_at,
                end_date = EXCLUDED.end_date,
                resolution_date = EXCLUDED.resolution_date,
                price_change_1h = EXCLUDED.price_change_1h,
                price_change_1d = EXCLUDED.price_change_1d,
                price_change_1w = EXCLUDED.price_change_1w,
                clob_token_ids = CASE
                    WHEN EXCLUDED.clob_token_ids IS NOT NULL
                         AND jsonb_array_length(EXCLUDED.clob_token_ids) > 0
                    THEN EXCLUDED.clob_token_ids
                    ELSE markets_poll.clob_token_ids
                END,
                tokens = CASE
                    WHEN EXCLUDED.tokens IS NOT NULL
                         AND jsonb_array_length(EXCLUDED.tokens) > 0
                    THEN EXCLUDED.tokens
                    ELSE markets_poll.tokens
                END,
                events = CASE
                    WHEN EXCLUDED.events IS NOT NULL
                         AND jsonb_array_length(EXCLUDED.events) > 0
                    THEN EXCLUDED.events
                    ELSE markets_poll.events
                END,
                market_type = EXCLUDED.market_type,
                restricted = EXCLUDED.restricted,
                resolution_status = EXCLUDED.resolution_status,
                winning_outcome = EXCLUDED.winning_outcome,
                polymarket_url = EXCLUDED.polymarket_url,
                updated_at = now()
            "#,
        )
        .bind(&m.market_id)
        .bind(&m.condition_id)
        .bind(&m.slug)
        .bind(&m.title)
        .bind(&m.description)
        .bind(&m.category)
        .bind(m.status.as_str())
        .bind(m.accepting_orders)
        .bind(m.archived)
        .bind(m.tradeable)
        .bind(&m.outcomes)
        .bind(&m.outcome_prices)
        .bind(m.last_mid)
        .bind(m.volume)
        .bind(m.volume_24hr)
        .bind(m.volume_1wk)
        .bind(m.volume_1mo)
        .bind(m.liquidity)
        .bind(m.spread)
        .bind(m.created_at)
        .bind(m.end_date)
        .bind(m.resolution_date)
        .bind(m.price_change_1h)
        .bind(m.price_change_1d)
        .bind(m.price_change_1w)
        .bind(Json(&m.clob_token_ids))
        .bind(Json(&m.tokens))
        .bind(Json(&m.events))
        .bind(&m.market_type)
        .bind(m.restricted)
        .bind(m.resolution_status.as_str())
        .bind(m.winning_outcome)
        .bind(&m.polymarket_url)
        .execute(&mut *tx)
        .await?;
        count += 1;
    }

    tx.commit().await?;
    Ok(count)
}

/// Non-RESOLVED market_ids with `volume ∈ [min_vol, max_vol)`, recently-expired
/// PROPOSED rows ranked first, then volume DESC. `count` ids are taken from a
/// rotating window (`offset = cycle_count mod len(tier_ids)`, wrapping) so
/// every market in the tier gets eventual coverage instead of the same
/// top-`count` markets every cycle.
pub async fn get_markets_by_volume_tier(
    pool: &PgPool,
    min_vol: f64,
    max_vol: f64,
    count: i64,
    include_non_resolved: bool,
    cycle_count: u64,
) -> anyhow::Result<Vec<String>> {
    let resolved_filter = if include_non_resolved {
        "resolution_status != 'RESOLVED'"
    } else {
        "TRUE"
    };

    let query = format!(
        r#"
        SELECT market_id FROM markets_poll
        WHERE {resolved_filter}
          AND volume >= $1 AND volume < $2
        ORDER BY (resolution_status = 'PROPOSED') DESC, volume DESC
        "#
    );

    let rows: Vec<(String,)> = sqlx::query_as(&query)
        .bind(min_vol)
        .bind(max_vol)
        .fetch_all(pool)
        .await?;
    let ids: Vec<String> = rows.into_iter().map(|(id,)| id).collect();

    if ids.is_empty() || count <= 0 {
        return Ok(Vec::new());
    }

    let len = ids.len();
    let offset = (cycle_count as usize) % len;
    let take = (count as usize).min(len);
    Ok((0..take).map(|i| ids[(offset + i) % len].clone()).collect())
}

pub async fn get_markets_by_expiry_tier(
    pool: &PgPool,
    hours: i64,
    limit: i64,
) -> anyhow::Result<Vec<String>> {
    let ids: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT market_id FROM markets_poll
        WHERE resolution_status != 'RESOLVED'
          AND end_date > now() AND end_date < now() + make_interval(hours => $1)
        ORDER BY end_date ASC
        LIMIT $2
        "#,
    )
    .bind(hours as i32)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(ids.into_iter().map(|(id,)| id).collect())
}

/// Set of all non-RESOLVED market_ids, 5-minute TTL cached. Renamed from the
/// source's `redis_cache.get_active_market_ids()` (stale name — it already
/// includes PENDING/PROPOSED, not just ACTIVE); semantics unchanged.
pub async fn get_existing_market_ids(
    pool: &PgPool,
    cache: &ExistingIdsCache,
) -> anyhow::Result<HashSet<String>> {
    {
        let guard = cache.inner.read().await;
        if let Some((fetched_at, ids)) = guard.as_ref() {
            if fetched_at.elapsed() < EXISTING_IDS_TTL {
                return Ok(ids.clone());
            }
        }
    }

    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT market_id FROM markets_poll WHERE resolution_status != 'RESOLVED'")
            .fetch_all(pool)
            .await?;
    let ids: HashSet<String> = rows.into_iter().map(|(id,)| id).collect();

    *cache.inner.write().await = Some((Instant::now(), ids.clone()));
    Ok(ids)
}

pub async fn get_market_by_id(pool: &PgPool, market_id: &str) -> anyhow::Result<Option<MarketRow>> {
    let row = sqlx::query_as::<_, MarketRow>("SELECT * FROM markets_poll WHERE market_id = $1")
        .bind(market_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get_market_by_condition_id(
    pool: &PgPool,
    condition_id: &str,
) -> anyhow::Result<Option<MarketRow>> {
    let row = sqlx::query_as::<_, MarketRow>("SELECT * FROM markets_poll WHERE condition_id = $1")
        .bind(condition_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Merge a sparse set of WS-delivered fields into `markets_ws`. Only the
/// `Some` fields in `partial` are written; a row is created on first write.
pub async fn upsert_market_ws(
    pool: &PgPool,
    market_id: &str,
    partial: WsFieldUpdate,
) -> anyhow::Result<bool> {
    if partial.is_empty() {
        return Ok(false);
    }

    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO markets_ws (market_id, updated_at");
    let mut cols: Vec<&str> = Vec::new();
    if partial.last_bb.is_some() {
        cols.push("last_bb");
    }
    if partial.last_ba.is_some() {
        cols.push("last_ba");
    }
    if partial.last_mid.is_some() {
        cols.push("last_mid");
    }
    if partial.last_trade_price.is_some() {
        cols.push("last_trade_price");
    }
    if partial.last_yes_price.is_some() {
        cols.push("last_yes_price");
    }
    if partial.last_no_price.is_some() {
        cols.push("last_no_price");
    }
    if partial.outcome_prices.is_some() {
        cols.push("outcome_prices");
    }

    for c in &cols {
        qb.push(", ").push(c);
    }
    qb.push(") VALUES (");
    qb.push_bind(market_id.to_string()).push(", now()");

    macro_rules! push_bind {
        ($field:expr) => {
            if let Some(v) = $field {
                qb.push(", ").push_bind(v);
            }
        };
    }
    push_bind!(partial.last_bb);
    push_bind!(partial.last_ba);
    push_bind!(partial.last_mid);
    push_bind!(partial.last_trade_price);
    push_bind!(partial.last_yes_price);
    push_bind!(partial.last_no_price);
    push_bind!(partial.outcome_prices.clone().map(Json));

    qb.push(") ON CONFLICT (market_id) DO UPDATE SET updated_at = now()");
    for c in &cols {
        qb.push(", ").push(c).push(" = EXCLUDED.").push(c);
    }

    qb.build().execute(pool).await?;
    Ok(true)
}

/// Two-step SQL lifecycle sweep from Pass 3: expire past-end-date ACTIVE
/// markets, then force-close ACTIVE markets stale for more than 3 days.
pub async fn mark_expired_markets_closed(pool: &PgPool) -> anyhow::Result<u64> {
    let expired = sqlx::query(
        r#"
        UPDATE markets_poll
        SET status = 'CLOSED', tradeable = false, accepting_orders = false,
            resolution_status = CASE WHEN resolution_status = 'PENDING' THEN 'PROPOSED' ELSE resolution_status END,
            updated_at = now()
        WHERE status = 'ACTIVE' AND end_date < now()
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();

    let stale = sqlx::query(
        r#"
        UPDATE markets_poll
        SET status = 'CLOSED', tradeable = false, accepting_orders = false, updated_at = now()
        WHERE status = 'ACTIVE' AND updated_at < now() - interval '3 days'
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();

    Ok(expired + stale)
}

/// Up to 1000 PROPOSED rows eligible for re-evaluation, prioritized by
/// has-user-position, recently-expired-within-24h, then oldest-first.
pub async fn get_proposed_for_reevaluation(pool: &PgPool) -> anyhow::Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT mp.market_id FROM markets_poll mp
        LEFT JOIN watched_markets wm ON wm.market_id = mp.market_id AND wm.active_positions > 0
        WHERE mp.resolution_status = 'PROPOSED'
          AND mp.winning_outcome IS NULL
          AND mp.end_date < now() - interval '1 hour'
          AND cardinality(mp.outcome_prices) = 2
        ORDER BY (wm.market_id IS NOT NULL) DESC,
                 (mp.end_date > now() - interval '24 hours') DESC,
                 mp.end_date ASC
        LIMIT 1000
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Promote PENDING rows whose `end_date` expired more than an hour ago to
/// PROPOSED — run once per cycle before Pass 4's re-evaluation query.
pub async fn promote_expired_pending(pool: &PgPool) -> anyhow::Result<u64> {
    let n = sqlx::query(
        r#"
        UPDATE markets_poll
        SET resolution_status = 'PROPOSED', updated_at = now()
        WHERE resolution_status = 'PENDING' AND end_date < now() - interval '1 hour'
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();
    Ok(n)
}

/// Write a resolved outcome back onto a PROPOSED/PENDING row without
/// disturbing other fields, used by Pass 4 once re-classification resolves
/// a market.
pub async fn mark_market_resolved(
    pool: &PgPool,
    market_id: &str,
    winning_outcome: i32,
    outcome_prices: &[rust_decimal::Decimal],
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE markets_poll
        SET status = 'CLOSED', tradeable = false, accepting_orders = false,
            resolution_status = 'RESOLVED', winning_outcome = $2,
            outcome_prices = $3, resolution_date = now(), updated_at = now()
        WHERE market_id = $1
        "#,
    )
    .bind(market_id)
    .bind(winning_outcome)
    .bind(outcome_prices)
    .execute(pool)
    .await?;
    Ok(())
}

/// `(events, category)` for every non-RESOLVED market_id in `ids`, used by
/// Pass 2 to re-inject fields the standalone-markets endpoint omits.
pub async fn load_preservation_fields(
    pool: &PgPool,
    ids: &[String],
) -> anyhow::Result<std::collections::HashMap<String, (Option<serde_json::Value>, Option<String>)>>
{
    if ids.is_empty() {
        return Ok(Default::default());
    }

    let rows: Vec<(String, Option<serde_json::Value>, Option<String>)> = sqlx::query_as(
        "SELECT market_id, events, category FROM markets_poll WHERE market_id = ANY($1) AND resolution_status != 'RESOLVED'",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, events, category)| (id, (events, category)))
        .collect())
}

fn is_yes_outcome(outcome: &str) -> bool {
    matches!(outcome.to_ascii_lowercase().as_str(), "yes" | "up")
}

fn is_no_outcome(outcome: &str) -> bool {
    matches!(outcome.to_ascii_lowercase().as_str(), "no" | "down")
}

/// Current price for `(market_id, outcome)`: the WS table first (live
/// ticks), falling back to the poll table's `outcome_prices` array. Returns
/// `None` when the market isn't monitored at all, per §4.7 step 2.
pub async fn get_current_price(
    pool: &PgPool,
    market_id: &str,
    outcome: &str,
) -> anyhow::Result<Option<rust_decimal::Decimal>> {
    let ws_row: Option<(
        Option<Json<serde_json::Map<String, serde_json::Value>>>,
        Option<rust_decimal::Decimal>,
        Option<rust_decimal::Decimal>,
    )> = sqlx::query_as(
        "SELECT outcome_prices, last_yes_price, last_no_price FROM markets_ws WHERE market_id = $1",
    )
    .bind(market_id)
    .fetch_optional(pool)
    .await?;

    if let Some((outcome_prices, last_yes, last_no)) = ws_row {
        if let Some(Json(map)) = outcome_prices {
            if let Some(v) = map.get(outcome).and_then(|v| v.as_str()) {
                if let Ok(price) = v.parse() {
                    return Ok(Some(price));
                }
            }
        }
        if is_yes_outcome(outcome) && last_yes.is_some() {
            return Ok(last_yes);
        }
        if is_no_outcome(outcome) && last_no.is_some() {
            return Ok(last_no);
        }
    }

    let poll_row: Option<(Vec<String>, Vec<rust_decimal::Decimal>)> =
        sqlx::query_as("SELECT outcomes, outcome_prices FROM markets_poll WHERE market_id = $1")
            .bind(market_id)
            .fetch_optional(pool)
            .await?;

    let Some((outcomes, prices)) = poll_row else {
        return Ok(None);
    };
    Ok(outcomes
        .iter()
        .position(|o| o == outcome)
        .and_then(|idx| prices.get(idx).copied()))
}

/// Freshness histogram for the every-60th-cycle health sweep: counts of
/// rows with `updated_at` younger than 5min / 1h / 6h, plus stale (>24h).
pub struct FreshnessHistogram {
    pub fresh_5m: i64,
    pub fresh_1h: i64,
    pub fresh_6h: i64,
    pub stale_24h: i64,
}

pub async fn freshness_histogram(pool: &PgPool) -> anyhow::Result<FreshnessHistogram> {
    let row: (i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            count(*) FILTER (WHERE updated_at > now() - interval '5 minutes'),
            count(*) FILTER (WHERE updated_at > now() - interval '1 hour'),
            count(*) FILTER (WHERE updated_at > now() - interval '6 hours'),
            count(*) FILTER (WHERE updated_at < now() - interval '24 hours')
        FROM markets_poll
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(FreshnessHistogram {
        fresh_5m: row.0,
        fresh_1h: row.1,
        fresh_6h: row.2,
        stale_24h: row.3,
    })
}
