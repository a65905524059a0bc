//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, routing::get, Router};
use obs_core::config::AppConfig;
use obs_core::http::HttpServer;
use obs_core::lifecycle::{Services, Shutdown};
use obs_core::logging::{EventLogger, StreamCapture};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Services whose logger writes to in-memory streams only.
pub fn capture_services(config: &AppConfig) -> (Services, StreamCapture) {
    let (builder, capture) = EventLogger::builder()
        .performance(config.performance.clone())
        .capture();
    (Services::with_logger(config, builder.build()), capture)
}

/// Application routes used by the HTTP tests.
pub fn test_routes() -> Router {
    Router::new()
        .route("/ok", get(|| async { "ok" }))
        .route(
            "/fail",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(600)).await;
                "finally"
            }),
        )
}

pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: Arc<Shutdown>,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Serve `routes` plus the health endpoints on an ephemeral port.
pub async fn start_server(config: &AppConfig, services: &Services, routes: Router) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Arc::new(Shutdown::new());

    let server = HttpServer::with_routes(&config.server, services, routes);
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    RunningServer {
        addr,
        shutdown,
        handle,
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// GET `url` directly, bypassing any proxy configured in the environment.
pub async fn http_get(url: String) -> reqwest::Response {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
        .get(url)
        .send()
        .await
        .unwrap()
}
