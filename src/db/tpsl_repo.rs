use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{TpslOrder, TpslStatus};

/// All ACTIVE orders, the working set for `run_tpsl_monitor`'s per-cycle sweep.
pub async fn get_active_orders(pool: &PgPool) -> anyhow::Result<Vec<TpslOrder>> {
    let rows = sqlx::query_as::<_, TpslOrder>(
        "SELECT * FROM tpsl_orders WHERE status = $1",
    )
    .bind(TpslStatus::Active.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn get_active_orders_for_market(
    pool: &PgPool,
    market_id: &str,
) -> anyhow::Result<Vec<TpslOrder>> {
    let rows = sqlx::query_as::<_, TpslOrder>(
        "SELECT * FROM tpsl_orders WHERE status = $1 AND market_id = $2",
    )
    .bind(TpslStatus::Active.as_str())
    .bind(market_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn mark_triggered(
    pool: &PgPool,
    order_id: Uuid,
    triggered_type: &str,
    execution_price: Decimal,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE tpsl_orders
        SET status = $2, triggered_type = $3, execution_price = $4, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(order_id)
    .bind(TpslStatus::Triggered.as_str())
    .bind(triggered_type)
    .bind(execution_price)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn mark_cancelled(pool: &PgPool, order_id: Uuid, reason: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE tpsl_orders
        SET status = $2, cancel_reason = $3, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(order_id)
    .bind(TpslStatus::Cancelled.as_str())
    .bind(reason)
    .execute(pool)
    .await?;

    Ok(())
}
