//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every service from the validated config, in dependency order
//! - Start background work (the timeout sweep)
//! - Stop everything again, once, on shutdown
//!
//! # Design Decisions
//! - Fail fast: a logger that cannot open its streams aborts startup
//! - `stop()` may be called from several shutdown paths; only the first does work

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::config::AppConfig;
use crate::instrumentation::RequestInstrumentation;
use crate::logging::{EventLogger, LoggerError};
use crate::timeouts::TimeoutManager;

const CONTEXT: &str = "LIFECYCLE";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to initialize the event logger: {0}")]
    Logger(#[from] LoggerError),
}

/// The process-wide service objects, shared by handle.
#[derive(Clone)]
pub struct Services {
    pub logger: EventLogger,
    pub timeouts: TimeoutManager,
    pub instrumentation: RequestInstrumentation,
    stopped: Arc<AtomicBool>,
}

impl Services {
    pub fn init(config: &AppConfig) -> Result<Self, StartupError> {
        let logger = EventLogger::from_config(&config.logging, &config.performance)?;
        Ok(Self::with_logger(config, logger))
    }

    /// Build the remaining services around an existing logger.
    pub fn with_logger(config: &AppConfig, logger: EventLogger) -> Self {
        let timeouts = TimeoutManager::new(&config.timeouts, logger.clone());
        let instrumentation = RequestInstrumentation::new(&config.instrumentation, logger.clone());
        Self {
            logger,
            timeouts,
            instrumentation,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start background tasks. Must be called from within a Tokio runtime.
    pub fn start(&self) {
        self.timeouts.start();
        self.logger.info("Services started", None, Some(CONTEXT));
    }

    /// Cancel pending timeouts and flush the log streams.
    /// Returns false if the services were already stopped.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        let cancelled = self.timeouts.shutdown();
        self.logger.info(
            "Services stopped",
            Some(json!({ "cancelledTimeouts": cancelled })),
            Some(CONTEXT),
        );
        self.logger.flush();
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::StreamCapture;
    use std::time::Duration;

    fn services() -> (Services, StreamCapture) {
        let (builder, capture) = EventLogger::builder().capture();
        (Services::with_logger(&AppConfig::default(), builder.build()), capture)
    }

    #[tokio::test]
    async fn test_stop_drains_timeouts_once() {
        let (services, capture) = services();
        services.start();
        services.timeouts.create_timeout(
            "retry",
            || async { Ok::<(), String>(()) },
            Duration::from_secs(60),
            None,
        );

        assert!(services.stop());
        assert!(!services.stop());
        assert!(services.is_stopped());
        assert_eq!(services.timeouts.active_count(), 0);

        let stopped: Vec<_> = capture
            .events_with_context(CONTEXT)
            .into_iter()
            .filter(|e| e["message"] == "Services stopped")
            .collect();
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0]["data"]["cancelledTimeouts"], 1);
    }

    #[test]
    fn test_init_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.logging.console = false;
        config.logging.directory = Some(dir.path().join("logs").display().to_string());

        let services = Services::init(&config).unwrap();
        services.logger.info("hello", None, None);
        services.logger.flush();

        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_init_rejects_unknown_level() {
        let mut config = AppConfig::default();
        config.logging.directory = None;
        config.logging.level = "loud".to_string();
        assert!(matches!(Services::init(&config), Err(StartupError::Logger(_))));
    }
}
