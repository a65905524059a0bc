//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → EventLogger → TimeoutManager → RequestInstrumentation → start()
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → server stops accepting → Services::stop
//!         → TimeoutManager::shutdown (cancel all, stop sweep)
//!         → EventLogger::flush
//! ```
//!
//! # Design Decisions
//! - Services are built once and handed out by handle; there is no global state
//! - Ordered startup: logger first, since every other service reports through it
//! - Ordered shutdown is the reverse; every step is idempotent

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::{Services, StartupError};
