pub mod market_repo;
pub mod poller_state_repo;
pub mod position_repo;
pub mod tpsl_repo;
pub mod watched_repo;
pub mod webhook_repo;

use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

/// Connections are capped at 3 (spec default) and prepared-statement caching
/// is disabled so the pool works behind a PgBouncer-style transaction
/// pooler, per the source's asyncpg `statement_cache_size=0` fix.
pub async fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let connect_opts = PgConnectOptions::from_str(database_url)?.statement_cache_capacity(0);

    let pool = PgPoolOptions::new()
        .max_connections(3)
        .connect_with(connect_opts)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;

    Ok(pool)
}
