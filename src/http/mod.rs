use std::net::SocketAddr;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::info;

use crate::errors::PoolError;
use crate::pool::{ConnectionPool, PoolStatus};

// -----------------------------------------------------------------------------
// ----- Status Surface --------------------------------------------------------

/// The two routes the pool exposes upward. Everything else (market data,
/// account operations) belongs to the facade that consumes this crate.
pub fn router(pool: ConnectionPool) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .with_state(pool)
}

pub async fn serve(pool: ConnectionPool, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("status endpoint listening on {addr}");
    axum::serve(listener, router(pool)).await
}

// -----------------------------------------------------------------------------
// ----- Handlers --------------------------------------------------------------

async fn status(State(pool): State<ConnectionPool>) -> Json<PoolStatus> {
    Json(pool.status())
}

async fn healthz(State(pool): State<ConnectionPool>) -> (StatusCode, Json<Value>) {
    let status = pool.status();
    if status.initialized && status.healthy > 0 {
        (
            StatusCode::OK,
            Json(json!({ "status": "ok", "healthy": status.healthy })),
        )
    } else {
        let reason = if status.initialized {
            "no healthy gateway sessions"
        } else {
            "connection pool not initialized"
        };
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "reason": reason })),
        )
    }
}

// -----------------------------------------------------------------------------
// ----- Error Mapping ---------------------------------------------------------

/// How facade route handlers translate pool failures: always 503, with the
/// remediation hint verbatim. Retry already happened inside the pool; a second
/// layer of retry up here would only hide a genuine outage.
pub fn error_response(err: &PoolError) -> (StatusCode, Json<Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "error": err.to_string(),
            "hint": err.hint(),
        })),
    )
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConnectError;
    use crate::gateway::{GatewayTarget, TcpConnector};
    use crate::pool::{PoolConfig, RetryConfig};
    use std::sync::Arc;
    use std::time::Duration;

    fn idle_pool() -> ConnectionPool {
        ConnectionPool::new(
            GatewayTarget {
                host: "127.0.0.1".to_string(),
                port: 4002,
                connect_timeout: Duration::from_secs(1),
            },
            PoolConfig::default(),
            RetryConfig::default(),
            Arc::new(TcpConnector),
        )
    }

    #[tokio::test]
    async fn healthz_reports_unavailable_before_init() {
        let (code, Json(body)) = healthz(State(idle_pool())).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["reason"], "connection pool not initialized");
    }

    #[tokio::test]
    async fn healthz_reports_unavailable_with_no_healthy_sessions() {
        let pool = idle_pool();
        pool.initialize();

        let (code, Json(body)) = healthz(State(pool.clone())).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["reason"], "no healthy gateway sessions");

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn status_serializes_per_session_detail() {
        let pool = idle_pool();
        pool.initialize();

        let Json(status) = status(State(pool.clone())).await;
        let body = serde_json::to_value(&status).unwrap();
        assert_eq!(body["total"], 5);
        assert_eq!(body["idle"], 5);
        assert_eq!(body["sessions"].as_array().unwrap().len(), 5);
        assert_eq!(body["sessions"][0]["state"], "disconnected");

        pool.shutdown().await;
    }

    #[test]
    fn pool_errors_map_to_503_with_hint() {
        let err = PoolError::connect_failed(ConnectError::Unreachable);
        let (code, Json(body)) = error_response(&err);
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["hint"], ConnectError::Unreachable.hint());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
