use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    store_type: String,
    last_generated_at: Option<String>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.read_snapshot().await;
    Json(HealthResponse {
        status: "ok",
        store_type: state.store.describe(),
        last_generated_at: snapshot.and_then(|s| s.timestamp),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::MemorySnapshotStore;
    use crate::types::Snapshot;
    use std::sync::Arc;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok",
            store_type: "composite(file)".to_string(),
            last_generated_at: None,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(
            json,
            r#"{"status":"ok","store_type":"composite(file)","last_generated_at":null}"#
        );
    }

    #[tokio::test]
    async fn test_health_handler_reports_last_generated() {
        let store = MemorySnapshotStore::with_snapshot(Snapshot {
            timestamp: Some("2025-02-01T12:00:00+00:00".to_string()),
            ..Snapshot::default()
        });
        let state = AppState::new(Arc::new(Config::default()), Arc::new(store));

        let Json(response) = health(State(state)).await;
        assert_eq!(response.status, "ok");
        assert_eq!(response.store_type, "memory");
        assert_eq!(response.last_generated_at.as_deref(), Some("2025-02-01T12:00:00+00:00"));
    }
}
