use crate::error::{AppError, Result};
use crate::types::Snapshot;
use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

/// Worker health as seen through the stored snapshot.
#[derive(Debug, Serialize)]
struct EngineStatus {
    stale: Option<bool>,
    last_fetch_status: String,
    last_success_at: Option<String>,
    scheduler_interval_sec: u64,
    store_type: String,
}

/// Get the latest published signal snapshot.
async fn latest_signal(State(state): State<AppState>) -> Result<Json<Snapshot>> {
    state.read_snapshot().await.map(Json).ok_or_else(|| {
        AppError::ServiceUnavailable(
            "No signal snapshot available yet. Worker has not produced one.".to_string(),
        )
    })
}

/// Get worker freshness and scheduler settings.
async fn engine_status(State(state): State<AppState>) -> Json<EngineStatus> {
    let snapshot = state.read_snapshot().await;
    let (stale, last_fetch_status, last_success_at) = match snapshot {
        Some(s) => (
            Some(s.stale),
            s.last_fetch_status.as_str().to_string(),
            s.last_success_at,
        ),
        None => (None, "unavailable".to_string(), None),
    };

    Json(EngineStatus {
        stale,
        last_fetch_status,
        last_success_at,
        scheduler_interval_sec: state.config.interval_secs,
        store_type: state.store.describe(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signal", get(latest_signal))
        .route("/engine/status", get(engine_status))
}
