//! HTTP(S) server for the Prometheus metrics endpoint.

use crate::metrics::MetricsRegistry;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;

/// Errors that can occur during metrics server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or serving failed.
    #[error("failed to serve on {addr}: {source}")]
    Serve {
        /// Address the server was bound to.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Configuration for the metrics server.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
    /// Path on which metrics are served.
    pub path: String,
    /// TLS configuration; plain HTTP when absent.
    pub tls: Option<Arc<rustls::ServerConfig>>,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 8080).into(),
            path: "/metrics".to_string(),
            tls: None,
        }
    }
}

/// HTTP server for exposing Prometheus metrics.
pub struct MetricsServer {
    config: MetricsServerConfig,
    registry: Arc<MetricsRegistry>,
    handle: Handle,
}

impl MetricsServer {
    /// Creates a new metrics server.
    pub fn new(config: MetricsServerConfig, registry: MetricsRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            handle: Handle::new(),
        }
    }

    /// Returns a handle that can shut the server down.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Builds the router serving the metrics and health endpoints.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.config.path, get(metrics_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.registry))
    }

    /// Starts the server.
    ///
    /// This method runs the server until it is shut down through its
    /// [`handle`](Self::handle).
    pub async fn run(self) -> Result<(), ServerError> {
        let app = self.router();
        let addr = self.config.bind_addr;

        let served = match self.config.tls {
            Some(tls) => {
                tracing::info!(addr = %addr, path = %self.config.path, "Serving metrics over HTTPS");
                axum_server::bind_rustls(addr, RustlsConfig::from_config(tls))
                    .handle(self.handle)
                    .serve(app.into_make_service())
                    .await
            }
            None => {
                tracing::info!(addr = %addr, path = %self.config.path, "Serving metrics over HTTP");
                axum_server::bind(addr)
                    .handle(self.handle)
                    .serve(app.into_make_service())
                    .await
            }
        };

        served.map_err(|source| ServerError::Serve { addr, source })
    }
}

/// Handler for the metrics endpoint.
///
/// Gathering runs the stats command, so it is moved off the async
/// workers.
async fn metrics_handler(State(registry): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    let encoded = tokio::task::spawn_blocking(move || registry.encode()).await;

    match encoded {
        Ok(Ok(output)) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                format!("Failed to encode metrics: {}", e),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "Metrics task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                "Failed to gather metrics".to_string(),
            )
        }
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
