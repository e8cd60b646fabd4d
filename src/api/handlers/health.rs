use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::db::poller_state_repo;
use crate::errors::AppError;
use crate::AppState;

/// Reports DB reachability and how stale the Poller's last completed cycle
/// is, so an operator can tell a dead ingestion loop from a dead database.
/// A broken DB connection is routed through `AppError` rather than swallowed,
/// so it surfaces in the response body and in the logs the same way any
/// other internal failure does.
pub async fn health_check(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    sqlx::query("SELECT 1").execute(&state.db).await?;

    let last_sync = poller_state_repo::get_last_sync(&state.db).await.ok().flatten();
    let stale = last_sync
        .map(|ts| chrono::Utc::now() - ts > chrono::Duration::minutes(5))
        .unwrap_or(false);

    let status = if stale { "degraded" } else { "healthy" };

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": status,
            "poller_last_sync": last_sync,
        })),
    ))
}
