//! Event logging subsystem.
//!
//! # Data Flow
//! ```text
//! Producers:
//!     EventLogger::{trace,debug,info,warn,error,fatal,log_error}
//!     tracing macros → bridge.rs (EventBridgeLayer)
//!     panics → hooks.rs
//!         │
//!         ▼
//!     logger.rs (LogRouter: level filter, redact.rs on the payload)
//!         ├─▶ console (colored line)
//!         ├─▶ all stream            every event
//!         ├─▶ error stream          ERROR, FATAL
//!         ├─▶ debug stream          DEBUG, TRACE
//!         └─▶ performance stream    metrics from the recorder
//! ```
//!
//! # Design Decisions
//! - One `EventLogger` per process, built at startup and passed by handle
//! - Streams are JSON lines, rolled daily
//! - A broken destination degrades to the remaining ones; logging never fails the caller

pub mod bridge;
pub mod event;
pub mod hooks;
pub mod logger;
pub mod redact;
pub mod sink;

use std::path::PathBuf;

use thiserror::Error;

pub use bridge::EventBridgeLayer;
pub use event::{ErrorShape, LogEvent, LogLevel, ParseLevelError};
pub use logger::{EventLogger, LoggerBuilder, StreamCapture};
pub use redact::{Redactor, REDACTED};
pub use sink::{SharedBuffer, StreamKind};

/// Errors raised while setting up the logger. Emitting events never fails.
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open the {kind} log stream: {source}")]
    Appender {
        kind: StreamKind,
        #[source]
        source: tracing_appender::rolling::InitError,
    },

    #[error(transparent)]
    Level(#[from] ParseLevelError),
}
