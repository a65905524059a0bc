//! Metrics exposition.
//!
//! # Metrics
//! - `operation_duration_ms` (histogram): every recorded sample, by operation
//! - `operation_failures_total` (counter): samples whose work failed
//! - `http_responses_total` (counter): instrumented responses, by method and status class
//!
//! Updates go through the `metrics` facade and are no-ops until a recorder
//! is installed with [`init_metrics`].

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::performance::buffer::Metric;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_histogram!(
        "operation_duration_ms",
        Unit::Milliseconds,
        "Duration of measured operations"
    );
    describe_counter!(
        "operation_failures_total",
        "Measured operations that returned an error"
    );
    describe_counter!("http_responses_total", "Instrumented HTTP responses");

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_operation(metric: &Metric) {
    let operation = metric.operation().to_string();
    histogram!("operation_duration_ms", "operation" => operation.clone())
        .record(metric.duration_ms() as f64);
    if metric.failed() {
        counter!("operation_failures_total", "operation" => operation).increment(1);
    }
}

pub fn record_http_response(method: &str, status: u16) {
    let class = match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    };
    counter!(
        "http_responses_total",
        "method" => method.to_string(),
        "status" => class
    )
    .increment(1);
}
