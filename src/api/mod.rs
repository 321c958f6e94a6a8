//! Read-only status API for the orchestrator.
//!
//! Provides HTTP endpoints for:
//! - Liveness and readiness probes
//! - The latest tick summary
//! - Active bots, overall or per user
//!
//! Handlers only read the snapshot published through [`StatusHandle`]; they
//! never touch the registry.

pub mod error;
pub mod routes;

use crate::config::ApiConfig;
use crate::lifecycle::StatusHandle;
use anyhow::{Context, Result};
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct ApiServer {
    bind: SocketAddr,
    status: StatusHandle,
}

impl ApiServer {
    pub fn new(status: StatusHandle, config: &ApiConfig) -> Result<Self> {
        let bind = config
            .bind
            .parse()
            .with_context(|| format!("Invalid api.bind address {:?}", config.bind))?;
        Ok(Self { bind, status })
    }

    /// Serve until `cancel` fires.
    pub async fn start(self, cancel: CancellationToken) -> Result<()> {
        let app = router(self.status);
        let listener = tokio::net::TcpListener::bind(self.bind)
            .await
            .with_context(|| format!("Failed to bind status API on {}", self.bind))?;

        info!("Status API listening on http://{}", self.bind);
        info!("Endpoints:");
        info!("  GET  /                    - Service info");
        info!("  GET  /version             - Version info");
        info!("  GET  /health              - Liveness probe");
        info!("  GET  /ready               - Readiness probe");
        info!("  GET  /status              - Latest tick summary");
        info!("  GET  /bots                - Active bots");
        info!("  GET  /users/:user_id/bots - Active bots for one user");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        Ok(())
    }
}

pub fn router(status: StatusHandle) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/version", get(version))
        .merge(routes::status::router(status.clone()))
        .merge(routes::bots::router(status))
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "meetbot",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "meetbot"
    }))
}


#[cfg(test)]
mod tests {
    use super::test_support::get_json;
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_service_info() {
        let (status, body) = get_json(router(StatusHandle::default()), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "meetbot");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_version() {
        let (status, body) = get_json(router(StatusHandle::default()), "/version").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "meetbot");
    }

    #[test]
    fn test_rejects_bad_bind() {
        let config = ApiConfig {
            enabled: true,
            bind: "not-an-address".to_string(),
        };
        assert!(ApiServer::new(StatusHandle::default(), &config).is_err());
    }
}
