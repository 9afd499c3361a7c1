//! Axum HTTP servers for metrics and health probes

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::{Error, Result};

/// Metrics endpoint handler
async fn metrics_handler() -> Result<String, StatusCode> {
    use prometheus_client::encoding::text::encode;
    let mut buffer = String::new();
    encode(&mut buffer, &crate::controller::metrics::REGISTRY).map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(buffer)
}

/// Liveness: the process is serving requests
async fn healthz() -> &'static str {
    "ok"
}

/// Readiness: the controllers have been started
async fn readyz(State(ready): State<Arc<AtomicBool>>) -> (StatusCode, &'static str) {
    if ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

fn metrics_router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
}

fn probe_router(ready: Arc<AtomicBool>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(ready)
}

async fn serve(addr: SocketAddr, app: Router, what: &str) -> Result<()> {
    let server_error = |message: String| Error::ServerError {
        addr: addr.to_string(),
        message,
    };
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| server_error(format!("failed to bind: {}", e)))?;
    info!("{} server listening on {}", what, addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| server_error(e.to_string()))?;
    Ok(())
}

/// Run the metrics and probe servers until one of them fails
pub async fn run_server(
    metrics_addr: SocketAddr,
    probe_addr: SocketAddr,
    ready: Arc<AtomicBool>,
) -> Result<()> {
    tokio::try_join!(
        serve(metrics_addr, metrics_router(), "Metrics"),
        serve(probe_addr, probe_router(ready), "Health probe"),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_handler_encodes_registry() {
        crate::controller::metrics::record_reconcile_error("decode");
        let body = metrics_handler().await.unwrap();
        assert!(body.contains("uptime_operator_reconcile_errors_total"));
        assert!(body.ends_with("# EOF\n"));
    }

    #[tokio::test]
    async fn test_readyz_follows_flag() {
        let ready = Arc::new(AtomicBool::new(false));
        let (status, _) = readyz(State(ready.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        ready.store(true, Ordering::Relaxed);
        let (status, body) = readyz(State(ready)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_bind_failure_is_server_error() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let err = serve(addr, metrics_router(), "Metrics").await.unwrap_err();
        assert!(matches!(err, Error::ServerError { .. }));
        assert!(err.to_string().contains(&addr.to_string()));
    }

    #[tokio::test]
    async fn test_servers_bind_and_answer() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ready = Arc::new(AtomicBool::new(true));
        tokio::spawn(async move {
            axum::serve(listener, probe_router(ready)).await.unwrap();
        });

        let body = reqwest::get(format!("http://{}/healthz", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }
}
