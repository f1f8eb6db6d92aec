//! HTTP scrape endpoint.
//!
//! Serves the gauge collection in the text exposition format at the
//! configured path, plus a liveness probe. Handlers only read the gauge
//! registry and never take the freshness lock.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tcpscope_common::constants::HEALTH_PATH;
use tcpscope_common::error::{Result, TcpscopeError};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::state::SharedState;

/// Builds the router serving `metrics_path` and the health probe.
pub fn router(state: Arc<SharedState>, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(handle_metrics))
        .route(HEALTH_PATH, get(handle_health))
        .with_state(state)
}

async fn handle_metrics(State(state): State<Arc<SharedState>>) -> Response {
    match state.gauges().encode() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn handle_health() -> &'static str {
    "ok"
}

/// Binds the metrics listener.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr).await.map_err(|e| TcpscopeError::Io {
        path: addr.to_string().into(),
        source: e,
    })
}

/// Serves scrapes on `listener` until `cancel` fires.
///
/// # Errors
///
/// Returns an error if the server fails while running.
pub async fn serve(
    listener: TcpListener,
    state: Arc<SharedState>,
    metrics_path: &str,
    cancel: CancellationToken,
) -> Result<()> {
    let local = listener.local_addr().map_err(|e| TcpscopeError::Io {
        path: "metrics listener".into(),
        source: e,
    })?;
    tracing::info!(addr = %local, path = metrics_path, "serving metrics");

    axum::serve(listener, router(state, metrics_path))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| TcpscopeError::Io {
            path: local.to_string().into(),
            source: e,
        })?;
    tracing::info!("metrics server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use tcpscope_common::types::LabelKey;
    use tokio::time::Instant;

    use super::*;
    use crate::labels::Publication;

    async fn start(
        state: Arc<SharedState>,
    ) -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<Result<()>>) {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { serve(listener, state, "/metrics", cancel).await }
        });
        (addr, cancel, handle)
    }

    #[tokio::test]
    async fn scrape_returns_published_series() {
        let state = Arc::new(SharedState::new(false).unwrap());
        let key = LabelKey {
            src_ip: "10.0.0.1".parse().unwrap(),
            src_pod: "web-1".into(),
            dst_ip: "10.0.0.2".parse().unwrap(),
            dst_pod: "db-1".into(),
            src_port: 1111,
            dst_port: 80,
        };
        let _ = state.publish(
            [Publication {
                key,
                send_bytes: Some(2048),
                resp_bytes: None,
                send_packets: None,
                resp_packets: None,
            }],
            Instant::now(),
        );

        let (addr, cancel, handle) = start(Arc::clone(&state)).await;
        let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
        assert!(response.status().is_success());
        let body = response.text().await.unwrap();
        assert!(body.contains("tcp_send_bytes_total{"));
        assert!(body.contains("src_pod=\"web-1\""));
        assert!(body.contains("2048"));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn health_probe_answers_ok() {
        let state = Arc::new(SharedState::new(false).unwrap());
        let (addr, cancel, handle) = start(state).await;
        let body = reqwest::get(format!("http://{addr}{HEALTH_PATH}"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
