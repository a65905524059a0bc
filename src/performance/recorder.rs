//! Duration measurement.
//!
//! # Responsibilities
//! - Wrap a unit of work, time it, and record the sample whatever the outcome
//! - Warn about operations slower than the configured threshold
//! - Answer stats and slow-operation queries from the ring buffer
//!
//! # Design Decisions
//! - The work's error is handed back untouched; recording never alters it
//! - Samples go to the ring buffer, the performance stream and the metrics facade
//! - Times come from `tokio::time::Instant` so paused-clock tests can drive them

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;

use crate::config::PerformanceConfig;
use crate::logging::logger::LogRouter;
use crate::logging::{EventLogger, LogEvent, LogLevel};
use crate::performance::buffer::{Metric, MetricBuffer, OperationStats, SlowOperation};
use crate::performance::export;

pub const CONTEXT: &str = "PERFORMANCE";

/// Shared handle to a metric ring buffer.
#[derive(Clone)]
pub struct PerformanceRecorder {
    inner: Arc<RecorderInner>,
}

struct RecorderInner {
    buffer: Mutex<MetricBuffer>,
    slow_threshold_ms: u64,
    router: Arc<LogRouter>,
}

impl PerformanceRecorder {
    /// A recorder with its own buffer, reporting through `logger`'s destinations.
    pub fn new(config: &PerformanceConfig, logger: &EventLogger) -> Self {
        Self::with_router(config, logger.router())
    }

    pub(crate) fn with_router(config: &PerformanceConfig, router: Arc<LogRouter>) -> Self {
        Self {
            inner: Arc::new(RecorderInner {
                buffer: Mutex::new(MetricBuffer::new(config.capacity)),
                slow_threshold_ms: config.slow_threshold_ms,
                router,
            }),
        }
    }

    /// Run `work` to completion and record how long it took.
    ///
    /// A failed run is recorded with `failed = true` and its error is
    /// returned unchanged.
    pub async fn monitor<F, Fut, T, E>(
        &self,
        operation: &str,
        work: F,
        metadata: Option<Value>,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let started = Instant::now();
        let result = work().await;
        self.finish(operation, started.elapsed(), metadata, &result);
        result
    }

    /// Synchronous counterpart of [`monitor`](Self::monitor).
    pub fn monitor_sync<F, T, E>(&self, operation: &str, work: F, metadata: Option<Value>) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: fmt::Display,
    {
        let started = Instant::now();
        let result = work();
        self.finish(operation, started.elapsed(), metadata, &result);
        result
    }

    fn finish<T, E: fmt::Display>(
        &self,
        operation: &str,
        elapsed: Duration,
        metadata: Option<Value>,
        result: &Result<T, E>,
    ) {
        match result {
            Ok(_) => self.record(operation, as_millis(elapsed), metadata, false),
            Err(e) => {
                let metadata = with_error(metadata, &e.to_string());
                self.record(operation, as_millis(elapsed), Some(metadata), true)
            }
        }
    }

    /// Start timing `operation`; the sample is recorded by [`Timer::end`].
    pub fn start_timer(&self, operation: impl Into<String>) -> Timer {
        Timer {
            recorder: self.clone(),
            operation: operation.into(),
            started: Instant::now(),
        }
    }

    /// Append an already-measured sample.
    pub fn record(&self, operation: &str, duration_ms: u64, metadata: Option<Value>, failed: bool) {
        let metric = Metric::new(operation, duration_ms, metadata, failed);

        self.inner.router.append_metric(&metric);
        export::record_operation(&metric);

        if duration_ms > self.inner.slow_threshold_ms {
            let mut data = json!({
                "operation": operation,
                "durationMs": duration_ms,
                "thresholdMs": self.inner.slow_threshold_ms,
                "failed": failed,
            });
            if let Some(metadata) = metric.metadata() {
                data["metadata"] = metadata.clone();
            }
            let event = LogEvent::new(LogLevel::Warn, format!("Slow operation: {}", operation))
                .with_context(CONTEXT)
                .with_data(data);
            self.inner.router.route(&event);
        }

        self.lock().push(metric);
    }

    /// Count, mean, max, min and recent samples over all metrics or one operation.
    pub fn stats(&self, operation: Option<&str>) -> OperationStats {
        self.lock().stats(operation)
    }

    /// Operations with samples above `threshold_ms`, slowest average first.
    pub fn slow_operations_report(&self, threshold_ms: u64) -> Vec<SlowOperation> {
        self.lock().slow_operations(threshold_ms)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn slow_threshold_ms(&self) -> u64 {
        self.inner.slow_threshold_ms
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricBuffer> {
        self.inner.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PerformanceRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceRecorder")
            .field("samples", &self.len())
            .field("slow_threshold_ms", &self.inner.slow_threshold_ms)
            .finish()
    }
}

/// A running measurement.
#[must_use = "a timer records nothing until `end` is called"]
#[derive(Debug)]
pub struct Timer {
    recorder: PerformanceRecorder,
    operation: String,
    started: Instant,
}

impl Timer {
    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop the timer, record the sample and return its duration in ms.
    pub fn end(self, metadata: Option<Value>) -> u64 {
        let duration_ms = as_millis(self.started.elapsed());
        self.recorder
            .record(&self.operation, duration_ms, metadata, false);
        duration_ms
    }
}

fn as_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn with_error(metadata: Option<Value>, error: &str) -> Value {
    match metadata {
        Some(Value::Object(mut map)) => {
            map.insert("error".to_string(), Value::String(error.to_string()));
            Value::Object(map)
        }
        Some(other) => json!({ "metadata": other, "error": error }),
        None => json!({ "error": error }),
    }
}
