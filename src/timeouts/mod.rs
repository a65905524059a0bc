//! Timeout and resource manager.
//!
//! # Data Flow
//! ```text
//! create_timeout(key, callback, delay)
//!     → registry (DashMap key → entry{generation, handle})
//!     → spawned task sleeps `delay`
//!     → task removes its own entry (generation must match)
//!     → callback runs; Err / panic → ERROR event
//!
//! sweep (every sweep_interval):
//!     entries older than max_age → abort + WARN each → INFO summary
//!
//! shutdown():
//!     stop sweep → abort every entry
//! ```
//!
//! # Design Decisions
//! - Independent of request handling; any delayed or debounced work may use it
//! - A key maps to at most one live entry
//! - Introspection never mutates the registry

pub mod manager;

use thiserror::Error;

pub use manager::{AgeBuckets, OldestTimeout, TimeoutManager, TimeoutStats};

#[derive(Debug, Error)]
pub enum TimeoutError {
    #[error("invalid key pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
