//! HTTP server setup.
//!
//! # Responsibilities
//! - Assemble the axum `Router`: health routes plus application routes
//! - Wire up middleware (request instrumentation, request timeout)
//! - Serve on a listener until the shutdown signal

use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::timeout::TimeoutLayer;

use crate::config::ServerConfig;
use crate::http::health;
use crate::instrumentation::instrument;
use crate::lifecycle::{shutdown, Services};

pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// A server exposing only the health endpoints.
    pub fn new(config: &ServerConfig, services: &Services) -> Self {
        Self::with_routes(config, services, Router::new())
    }

    /// A server exposing `routes` next to the health endpoints.
    pub fn with_routes(config: &ServerConfig, services: &Services, routes: Router) -> Self {
        Self {
            router: Self::build_router(config, services, routes),
        }
    }

    /// Timed-out requests still pass through instrumentation, so they are
    /// logged with their 408 status.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, services: &Services, routes: Router) -> Router {
        let app = routes
            .merge(health::routes(services.clone()))
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)));
        instrument(app, services.instrumentation.clone())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Accept connections until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
