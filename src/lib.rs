//! Observability and resource-lifecycle core.
//!
//! - [`logging`]: structured event logger with redaction and per-level streams
//! - [`performance`]: duration measurement over a bounded metric history
//! - [`timeouts`]: keyed registry of cancellable delayed callbacks
//! - [`instrumentation`]: one entry and one exit event per HTTP request
//!
//! Services are built once by [`lifecycle::Services`] and passed by handle.

pub mod config;
pub mod http;
pub mod instrumentation;
pub mod lifecycle;
pub mod logging;
pub mod performance;
pub mod timeouts;

pub use config::AppConfig;
pub use http::HttpServer;
pub use instrumentation::RequestInstrumentation;
pub use lifecycle::{Services, Shutdown};
pub use logging::EventLogger;
pub use performance::PerformanceRecorder;
pub use timeouts::TimeoutManager;
