//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum::serve, graceful shutdown)
//!     → request instrumentation (entry event, correlation id)
//!     → request timeout
//!     → health.rs handlers or application routes
//!     → instrumented response body (exit event)
//! ```

pub mod health;
pub mod server;

pub use server::HttpServer;
