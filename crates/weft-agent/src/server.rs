//! HTTP server assembly

use crate::handlers;
use crate::{AgentError, Result};
use axum::routing::{delete, get, post};
use axum::Router as AxumRouter;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use weft_core::WeftConfig;
use weft_queue::QueueStore;
use weft_registry::NodeRegistry;
use weft_router::Router;

/// Shared application state behind every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<NodeRegistry>,
    pub router: Arc<Router>,
    pub queue: QueueStore,
    pub config: WeftConfig,
}

/// The REST surface of the control plane
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    /// Create a server over assembled components
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Serve until the shutdown signal flips
    pub async fn serve(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = self
            .state
            .config
            .server
            .bind_address
            .parse()
            .map_err(|e| AgentError::Configuration(format!("invalid bind address: {}", e)))?;

        let app = self.app();

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| AgentError::Server(format!("failed to bind {}: {}", addr, e)))?;

        info!(address = %addr, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| AgentError::Server(format!("HTTP server failed: {}", e)))
    }

    /// The Axum application with all routes
    pub fn app(&self) -> AxumRouter {
        AxumRouter::new()
            .route("/health", get(handlers::health))
            .route("/v1/register", post(handlers::register))
            .route("/v1/heartbeat/:name", post(handlers::heartbeat))
            .route("/v1/nodes", get(handlers::list_nodes))
            .route("/v1/topology", get(handlers::topology))
            .route("/v1/stats", get(handlers::stats))
            .route("/v1/route", post(handlers::route))
            .route("/v1/benchmark", post(handlers::benchmark))
            .route("/v1/queue/status", get(handlers::queue_status))
            .route("/v1/queue/entries", get(handlers::queue_entries))
            .route("/v1/queue/entries/:id", delete(handlers::queue_remove))
            .route("/v1/queue/dropped", get(handlers::queue_dropped))
            .with_state(self.state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
    }
}
