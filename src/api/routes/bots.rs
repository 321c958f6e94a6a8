//! Active bot listings.

use crate::api::error::ApiResult;
use crate::lifecycle::{BotStatus, StatusHandle};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};

pub fn router(status: StatusHandle) -> Router {
    Router::new()
        .route("/bots", get(list_bots))
        .route("/users/:user_id/bots", get(list_user_bots))
        .with_state(status)
}

/// GET /bots - Every active bot as of the last tick.
async fn list_bots(State(status): State<StatusHandle>) -> ApiResult<Json<Vec<BotStatus>>> {
    let bots = status
        .get()
        .await
        .summary
        .map(|summary| summary.bots)
        .unwrap_or_default();
    Ok(Json(bots))
}

/// GET /users/:user_id/bots - Active bots for one user (at most one).
async fn list_user_bots(
    State(status): State<StatusHandle>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<BotStatus>>> {
    let bots = status
        .get()
        .await
        .summary
        .map(|summary| summary.bots_for_user(&user_id).cloned().collect())
        .unwrap_or_default();
    Ok(Json(bots))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::get_json;
    use crate::lifecycle::StatusSummary;
    use crate::registry::BotState;
    use axum::http::StatusCode;
    use chrono::Local;

    fn bot(meeting_id: &str, user_id: &str) -> BotStatus {
        BotStatus {
            meeting_id: meeting_id.to_string(),
            user_id: user_id.to_string(),
            meeting_number: "123456789".to_string(),
            state: BotState::Running,
            pid: Some(4242),
            started_at: Local::now(),
            elapsed_minutes: 5,
            remaining_minutes: 25,
        }
    }

    async fn handle_with(bots: Vec<BotStatus>) -> StatusHandle {
        let handle = StatusHandle::default();
        handle
            .publish(StatusSummary {
                generated_at: Local::now(),
                tick: 1,
                active_bots: bots.len(),
                users_monitored: bots.len(),
                meetings_listed: bots.len(),
                directory_ok: true,
                bots,
                last_error: None,
            })
            .await;
        handle
    }

    #[tokio::test]
    async fn test_list_bots_before_first_tick_is_empty() {
        let (status, body) = get_json(router(StatusHandle::default()), "/bots").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_list_bots() {
        let handle = handle_with(vec![bot("m1", "u1"), bot("m2", "u2")]).await;
        let (status, body) = get_json(router(handle), "/bots").await;

        assert_eq!(status, StatusCode::OK);
        let bots = body.as_array().unwrap();
        assert_eq!(bots.len(), 2);
        assert_eq!(bots[0]["meeting_id"], "m1");
        assert_eq!(bots[0]["state"], "running");
        assert_eq!(bots[0]["pid"], 4242);
    }

    #[tokio::test]
    async fn test_list_user_bots() {
        let handle = handle_with(vec![bot("m1", "u1"), bot("m2", "u2")]).await;

        let (status, body) = get_json(router(handle.clone()), "/users/u2/bots").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["meeting_id"], "m2");

        let (_, body) = get_json(router(handle), "/users/nobody/bots").await;
        assert_eq!(body, serde_json::json!([]));
    }
}
