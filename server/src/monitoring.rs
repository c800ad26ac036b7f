//! Prometheus gauges describing the stored state, and the HTTP endpoint
//! that exposes them.

use crate::error::ServerError;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use log::{error, info};
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct Monitoring {
    registry: Registry,
    available_sessions: IntGauge,
    available_lobbies: IntGauge,
}

impl Monitoring {
    pub fn new() -> Result<Self, ServerError> {
        let registry = Registry::new();
        let available_sessions =
            IntGauge::new("available_sessions", "Number of sessions in storage")?;
        let available_lobbies = IntGauge::new("available_lobbies", "Number of lobbies in storage")?;

        registry.register(Box::new(available_sessions.clone()))?;
        registry.register(Box::new(available_lobbies.clone()))?;

        Ok(Self {
            registry,
            available_sessions,
            available_lobbies,
        })
    }

    pub fn set_available_sessions(&self, value: i64) {
        self.available_sessions.set(value);
    }

    pub fn set_available_lobbies(&self, value: i64) {
        self.available_lobbies.set(value);
    }

    pub fn available_sessions(&self) -> i64 {
        self.available_sessions.get()
    }

    pub fn available_lobbies(&self) -> i64 {
        self.available_lobbies.get()
    }

    /// Renders every gauge in the text exposition format.
    pub fn gather(&self) -> Result<String, ServerError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Serves `GET /metrics` on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    monitoring: Monitoring,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    info!("Metrics endpoint listening on {}", listener.local_addr()?);
    let app = Router::new()
        .route("/metrics", get(metrics))
        .with_state(monitoring);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    info!("Metrics endpoint stopped");
    Ok(())
}

async fn metrics(State(monitoring): State<Monitoring>) -> Response {
    match monitoring.gather() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn fetch(addr: std::net::SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_metrics_endpoint_serves_gauges() {
        let monitoring = Monitoring::new().unwrap();
        monitoring.set_available_sessions(4);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(listener, monitoring.clone(), cancel.clone()));

        let response = fetch(addr, "/metrics").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("available_sessions 4"));

        monitoring.set_available_sessions(5);
        assert!(fetch(addr, "/metrics").await.contains("available_sessions 5"));
        assert!(fetch(addr, "/missing").await.starts_with("HTTP/1.1 404"));

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_gauges_are_exposed() {
        let monitoring = Monitoring::new().unwrap();
        monitoring.set_available_sessions(3);
        monitoring.set_available_lobbies(12);

        let text = monitoring.gather().unwrap();

        assert!(text.contains("available_sessions 3"));
        assert!(text.contains("available_lobbies 12"));
    }
}
