use sqlx::PgPool;

use crate::models::UserPosition;

/// Open positions for a market, used by the TP/SL Monitor's cancellation
/// sweep to detect when `monitored_tokens` has drifted from the user's
/// actual holdings.
pub async fn get_positions_for_market(
    pool: &PgPool,
    market_id: &str,
) -> anyhow::Result<Vec<UserPosition>> {
    let rows = sqlx::query_as::<_, UserPosition>(
        "SELECT market_id, outcome, token_count, entry_price FROM user_positions WHERE market_id = $1",
    )
    .bind(market_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn get_position(
    pool: &PgPool,
    user_id: &str,
    market_id: &str,
    outcome: &str,
) -> anyhow::Result<Option<UserPosition>> {
    let row = sqlx::query_as::<_, UserPosition>(
        "SELECT market_id, outcome, token_count, entry_price FROM user_positions WHERE user_id = $1 AND market_id = $2 AND outcome = $3",
    )
    .bind(user_id)
    .bind(market_id)
    .bind(outcome)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
