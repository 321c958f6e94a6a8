//! Probe and summary routes.

use crate::api::error::{ApiError, ApiResult};
use crate::lifecycle::{StatusHandle, StatusSummary};
use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};

pub fn router(status: StatusHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/status", get(summary))
        .with_state(status)
}

/// GET /health - The process is up.
async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// GET /ready - At least one tick has completed and shutdown has not begun.
async fn ready(State(status): State<StatusHandle>) -> ApiResult<Json<Value>> {
    let state = status.get().await;
    if state.shutting_down {
        return Err(ApiError::unavailable("shutting down"));
    }
    if !state.is_ready() {
        return Err(ApiError::unavailable("waiting for first tick"));
    }
    Ok(Json(json!({ "status": "ready" })))
}

/// GET /status - Summary published by the most recent tick.
async fn summary(State(status): State<StatusHandle>) -> ApiResult<Json<StatusSummary>> {
    status
        .get()
        .await
        .summary
        .map(Json)
        .ok_or_else(|| ApiError::unavailable("no tick has completed yet"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::get_json;
    use axum::http::StatusCode;
    use chrono::Local;

    fn sample_summary() -> StatusSummary {
        StatusSummary {
            generated_at: Local::now(),
            tick: 4,
            active_bots: 0,
            users_monitored: 3,
            meetings_listed: 5,
            directory_ok: true,
            bots: Vec::new(),
            last_error: None,
        }
    }

    #[tokio::test]
    async fn test_health_always_ok() {
        let (status, body) = get_json(router(StatusHandle::default()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_waits_for_first_tick() {
        let handle = StatusHandle::default();

        let (status, body) = get_json(router(handle.clone()), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], true);
        assert_eq!(body["status"], 503);

        handle.publish(sample_summary()).await;
        let (status, body) = get_json(router(handle.clone()), "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");

        handle.set_shutting_down().await;
        let (status, _) = get_json(router(handle), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_status_returns_latest_summary() {
        let handle = StatusHandle::default();
        let (status, _) = get_json(router(handle.clone()), "/status").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        handle.publish(sample_summary()).await;
        let (status, body) = get_json(router(handle), "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tick"], 4);
        assert_eq!(body["users_monitored"], 3);
        assert_eq!(body["directory_ok"], true);
        assert!(body["last_error"].is_null());
    }
}
