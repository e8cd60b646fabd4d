use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// The entire operability surface: `/health` and `/metrics`. Everything
/// else the teacher exposed (dashboard, whales, trades, baskets, trading
/// control) belonged to the external trading layer this crate no longer
/// owns.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::render))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
