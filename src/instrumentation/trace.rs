//! Per-request instrumentation state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::instrumentation::correlation::new_correlation_id;

/// State of one inbound request, from entry to its single exit event.
///
/// Shared between the middleware, the response body wrapper and handlers
/// (through request extensions), so the mutable parts are atomics.
#[derive(Debug)]
pub struct RequestTrace {
    correlation_id: String,
    method: String,
    operation_path: String,
    started_at: Instant,
    exited: AtomicBool,
    response_bytes: AtomicU64,
}

impl RequestTrace {
    pub fn new(method: impl Into<String>, operation_path: impl Into<String>) -> Self {
        Self {
            correlation_id: new_correlation_id(),
            method: method.into(),
            operation_path: operation_path.into(),
            started_at: Instant::now(),
            exited: AtomicBool::new(false),
            response_bytes: AtomicU64::new(0),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Matched route when known, raw path otherwise.
    pub fn operation_path(&self) -> &str {
        &self.operation_path
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Add `len` emitted bytes; returns the new total.
    pub fn add_bytes(&self, len: u64) -> u64 {
        self.response_bytes.fetch_add(len, Ordering::Relaxed) + len
    }

    pub fn response_bytes(&self) -> u64 {
        self.response_bytes.load(Ordering::Relaxed)
    }

    /// True for exactly one caller over the lifetime of the trace.
    pub fn claim_exit(&self) -> bool {
        !self.exited.swap(true, Ordering::AcqRel)
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }
}
