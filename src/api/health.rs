//! Health check endpoint.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    /// "running" while the pipeline consumer is alive, "stopped" after a
    /// drain or a worker panic.
    pub processor_status: &'static str,
    pub version: &'static str,
}

/// `GET /health` — liveness plus pipeline consumer state.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    let running = ctx.worker_running.load(Ordering::Relaxed);

    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
        processor_status: if running { "running" } else { "stopped" },
        version: crate::config::APP_VERSION,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn ctx(running: bool) -> ApiContext {
        ApiContext { worker_running: Arc::new(AtomicBool::new(running)) }
    }

    #[tokio::test]
    async fn reports_running_processor() {
        let Json(body) = check(State(ctx(true))).await;
        assert_eq!(body.status, "healthy");
        assert_eq!(body.processor_status, "running");
        assert!(!body.timestamp.is_empty());
    }

    #[tokio::test]
    async fn reports_stopped_processor() {
        let Json(body) = check(State(ctx(false))).await;
        assert_eq!(body.processor_status, "stopped");
    }

    #[tokio::test]
    async fn health_route_serves_json() {
        use axum::body::to_bytes;
        use axum::http::Request;
        use tower::ServiceExt as _;

        let app = super::super::router(ctx(true));
        let response = app
            .oneshot(Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["processor_status"], "running");
    }
}
