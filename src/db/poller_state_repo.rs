use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Singleton row tracking the poller's last successful full cycle, surfaced
/// on `/health` so an operator can see how stale the feed is.
pub async fn get_last_sync(pool: &PgPool) -> anyhow::Result<Option<DateTime<Utc>>> {
    let row: Option<(Option<DateTime<Utc>>,)> =
        sqlx::query_as("SELECT last_sync FROM poller_state WHERE id = 1")
            .fetch_optional(pool)
            .await?;

    Ok(row.and_then(|(ts,)| ts))
}

pub async fn update_last_sync(pool: &PgPool, ts: DateTime<Utc>) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO poller_state (id, last_sync, updated_at) VALUES (1, $1, now())
        ON CONFLICT (id) DO UPDATE SET last_sync = EXCLUDED.last_sync, updated_at = now()
        "#,
    )
    .bind(ts)
    .execute(pool)
    .await?;

    Ok(())
}
