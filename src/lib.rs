pub mod api;
pub mod config;
pub mod core;
pub mod db;
pub mod errors;
pub mod fetcher;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod poller;
pub mod price_router;
pub mod redeemable;
pub mod signals;
pub mod subscriptions;
pub mod tpsl;
pub mod ws;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::AppConfig;

/// Shared state for the axum operability surface (`/health`, `/metrics`).
/// The ingestion workers hold their own `Core` handle (see `core.rs`); this
/// struct is deliberately smaller — the HTTP surface only ever reads.
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: AppConfig,
    pub metrics_handle: PrometheusHandle,
}
