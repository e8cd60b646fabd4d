use sqlx::PgPool;

use crate::models::WatchedMarket;

/// All markets with at least one open user position, used to build the
/// always-poll tier and the WS subscription target set.
pub async fn get_watched_markets(pool: &PgPool) -> anyhow::Result<Vec<WatchedMarket>> {
    let rows = sqlx::query_as::<_, WatchedMarket>(
        "SELECT * FROM watched_markets WHERE active_positions > 0 ORDER BY last_position_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Non-RESOLVED `market_id`s with at least one open user position — the
/// Poller's USER_POSITIONS tier.
pub async fn get_user_position_market_ids(pool: &PgPool) -> anyhow::Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT wm.market_id
        FROM watched_markets wm
        JOIN markets_poll mp ON mp.market_id = wm.market_id AND mp.resolution_status != 'RESOLVED'
        WHERE wm.active_positions > 0
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Distinct `clob_token_ids` from non-RESOLVED markets with user positions,
/// the WS Client's subscription sync target set `D`. `limit` bounds the
/// number of token ids returned, not the number of market rows scanned —
/// each market contributes multiple tokens, so the cap is applied after
/// flattening.
pub async fn get_active_position_token_ids(
    pool: &PgPool,
    limit: i64,
) -> anyhow::Result<Vec<String>> {
    let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
        r#"
        SELECT mp.clob_token_ids
        FROM watched_markets wm
        JOIN markets_poll mp ON mp.market_id = wm.market_id
        WHERE wm.active_positions > 0
          AND mp.clob_token_ids IS NOT NULL
          AND mp.resolution_status != 'RESOLVED'
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut ids: Vec<String> = rows
        .into_iter()
        .filter_map(|(v,)| serde_json::from_value::<Vec<String>>(v).ok())
        .flatten()
        .collect();
    ids.sort();
    ids.dedup();
    ids.truncate(limit.max(0) as usize);
    Ok(ids)
}
