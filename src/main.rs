//! obs-core service binary.
//!
//! ```text
//! config (TOML + CLI overrides)
//!     → Services::init (EventLogger, TimeoutManager, RequestInstrumentation)
//!     → tracing registry: EnvFilter + EventBridgeLayer
//!     → panic hook, optional Prometheus exporter
//!     → HttpServer::run until SIGINT/SIGTERM
//!     → Services::stop (cancel timeouts, flush streams)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use obs_core::config::{load_config, AppConfig};
use obs_core::http::HttpServer;
use obs_core::lifecycle::{wait_for_signal, Services, Shutdown};
use obs_core::logging::hooks::install_panic_hook;
use obs_core::logging::EventBridgeLayer;
use obs_core::performance::export::init_metrics;

#[derive(Parser)]
#[command(name = "obs-core")]
#[command(version, about = "Structured logging, request instrumentation and timeout management service", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `server.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    let services = Services::init(&config)?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with(EventBridgeLayer::new(services.logger.clone()))
        .init();
    install_panic_hook(services.logger.clone());

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "obs-core starting");
    tracing::info!(
        bind_address = %config.server.bind_address,
        log_directory = ?config.logging.directory,
        slow_threshold_ms = config.performance.slow_threshold_ms,
        timeout_max_age_secs = config.timeouts.max_age_secs,
        "Configuration loaded"
    );

    if config.metrics.enabled {
        match config.metrics.address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.metrics.address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    services.start();

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let shutdown = Arc::new(Shutdown::new());
    let server_shutdown = shutdown.subscribe();

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_shutdown.trigger();
    });

    let server = HttpServer::new(&config.server, &services);
    let result = server.run(listener, server_shutdown).await;

    services.stop();
    tracing::info!("Shutdown complete");
    result?;
    Ok(())
}
