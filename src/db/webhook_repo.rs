use sqlx::PgPool;

/// Append-only webhook event log (`markets_wh`), supplementing the poller's
/// own state with a record of what upstream pushed and when.
pub async fn record_event(
    pool: &PgPool,
    market_id: &str,
    event: &str,
    payload: serde_json::Value,
) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO markets_wh (market_id, event, payload) VALUES ($1, $2, $3)")
        .bind(market_id)
        .bind(event)
        .bind(payload)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn get_recent_events(
    pool: &PgPool,
    market_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<(String, serde_json::Value, chrono::DateTime<chrono::Utc>)>> {
    let rows: Vec<(String, serde_json::Value, chrono::DateTime<chrono::Utc>)> = sqlx::query_as(
        "SELECT event, payload, updated_at FROM markets_wh WHERE market_id = $1 ORDER BY id DESC LIMIT $2",
    )
    .bind(market_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
