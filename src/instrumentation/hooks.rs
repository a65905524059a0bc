//! Request lifecycle hooks.
//!
//! # Responsibilities
//! - Open a [`RequestTrace`] and log the entry event
//! - Count emitted response bytes
//! - Log the single exit event, whichever exit path fires first
//! - Record slow requests with the performance recorder
//!
//! # Design Decisions
//! - Framework-neutral: the axum middleware is one caller, other host
//!   layers can drive the same hooks directly
//! - Header values are redacted by header name here; the logger redacts the
//!   whole payload again by its own deny-list

use std::sync::Arc;

use axum::http::HeaderMap;
use serde_json::{json, Map, Value};
use tokio::time::Instant;

use crate::config::InstrumentationConfig;
use crate::instrumentation::outcome::{ExitTrigger, ResponseOutcome};
use crate::instrumentation::process::ProcessSnapshot;
use crate::instrumentation::trace::RequestTrace;
use crate::logging::{EventLogger, LogEvent, LogLevel, Redactor, REDACTED};
use crate::performance::export;

pub const REQUEST_CONTEXT: &str = "HTTP_REQUEST";
pub const RESPONSE_CONTEXT: &str = "HTTP_RESPONSE";

/// What the host layer knows about a request when it starts.
#[derive(Debug, Clone, Copy)]
pub struct RequestInfo<'a> {
    pub method: &'a str,
    pub path: &'a str,
    /// Route template the request matched, e.g. `/users/{id}`.
    pub route: Option<&'a str>,
    /// Raw query string without the leading `?`.
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
    pub body: Option<&'a Value>,
}

/// Shared request instrumentation service.
#[derive(Clone)]
pub struct RequestInstrumentation {
    inner: Arc<Inner>,
}

struct Inner {
    logger: EventLogger,
    config: InstrumentationConfig,
    header_redactor: Redactor,
    started_at: Instant,
}

impl RequestInstrumentation {
    pub fn new(config: &InstrumentationConfig, logger: EventLogger) -> Self {
        Self {
            inner: Arc::new(Inner {
                header_redactor: Redactor::new(&config.redact_headers),
                config: config.clone(),
                logger,
                started_at: Instant::now(),
            }),
        }
    }

    pub fn config(&self) -> &InstrumentationConfig {
        &self.inner.config
    }

    pub fn logger(&self) -> &EventLogger {
        &self.inner.logger
    }

    /// Start tracking a request and log its entry event.
    pub fn on_request_start(&self, info: RequestInfo<'_>) -> Arc<RequestTrace> {
        let trace = Arc::new(RequestTrace::new(
            info.method,
            info.route.unwrap_or(info.path),
        ));

        let mut data = json!({
            "method": info.method,
            "path": info.path,
            "headers": self.header_map(info.headers),
        });
        if let Some(route) = info.route {
            data["route"] = json!(route);
        }
        if let Some(query) = info.query.filter(|q| !q.is_empty()) {
            data["query"] = parse_query(query);
        }
        if let Some(body) = info.body {
            data["body"] = body.clone();
        }

        self.inner.logger.log(
            LogEvent::new(LogLevel::Info, format!("{} {}", info.method, info.path))
                .with_context(REQUEST_CONTEXT)
                .with_data(data)
                .with_correlation_id(trace.correlation_id()),
        );
        trace
    }

    /// Count one emitted chunk.
    pub fn on_chunk(&self, trace: &RequestTrace, len: usize) {
        trace.add_bytes(len as u64);
    }

    /// The host sent the response body in one call. `chunk` is counted
    /// before the exit event is logged.
    pub fn on_body_sent(&self, trace: &RequestTrace, status: u16, chunk: Option<&[u8]>) -> bool {
        if let Some(chunk) = chunk {
            self.on_chunk(trace, chunk.len());
        }
        self.finish(trace, status, ExitTrigger::BodySent)
    }

    pub fn on_finished(&self, trace: &RequestTrace, status: u16) -> bool {
        self.finish(trace, status, ExitTrigger::Finished)
    }

    pub fn on_client_disconnect(&self, trace: &RequestTrace, status: u16) -> bool {
        self.finish(trace, status, ExitTrigger::ClientDisconnect)
    }

    pub fn on_body_error(&self, trace: &RequestTrace, status: u16) -> bool {
        self.finish(trace, status, ExitTrigger::BodyError)
    }

    /// Log the exit event unless another path already did.
    /// Returns whether this call emitted it.
    fn finish(&self, trace: &RequestTrace, status: u16, trigger: ExitTrigger) -> bool {
        if !trace.claim_exit() {
            return false;
        }

        let config = &self.inner.config;
        let duration_ms = u64::try_from(trace.elapsed().as_millis()).unwrap_or(u64::MAX);
        let outcome = ResponseOutcome::classify(status, duration_ms, config.slow_ms, config.very_slow_ms);
        let operation = format!("{} {}", trace.method(), trace.operation_path());

        let mut data = json!({
            "method": trace.method(),
            "path": trace.operation_path(),
            "statusCode": status,
            "durationMs": duration_ms,
            "responseBytes": trace.response_bytes(),
            "outcome": outcome,
            "trigger": trigger,
        });
        if outcome == ResponseOutcome::ServerError {
            let snapshot = ProcessSnapshot::capture(self.inner.started_at.elapsed());
            data["process"] = json!(snapshot);
        }

        self.inner.logger.log(
            LogEvent::new(
                outcome.level(),
                format!("{} {} {}ms", operation, status, duration_ms),
            )
            .with_context(RESPONSE_CONTEXT)
            .with_data(data)
            .with_correlation_id(trace.correlation_id()),
        );

        export::record_http_response(trace.method(), status);
        if duration_ms > config.metric_threshold_ms {
            self.inner.logger.performance().record(
                &operation,
                duration_ms,
                Some(json!({
                    "statusCode": status,
                    "correlationId": trace.correlation_id(),
                })),
                status >= 500,
            );
        }
        true
    }

    fn header_map(&self, headers: &HeaderMap) -> Value {
        let mut map = Map::new();
        for (name, value) in headers {
            let value = if self.inner.header_redactor.is_sensitive(name.as_str()) {
                Value::String(REDACTED.to_string())
            } else {
                Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned())
            };
            map.insert(name.as_str().to_string(), value);
        }
        Value::Object(map)
    }
}

/// Decode a query string into a JSON object. Repeated keys keep the last value.
fn parse_query(query: &str) -> Value {
    let map: Map<String, Value> = url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect();
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::StreamCapture;
    use axum::http::HeaderValue;
    use std::time::Duration;

    fn instrumentation() -> (RequestInstrumentation, StreamCapture) {
        let (builder, capture) = EventLogger::builder().capture();
        let instr = RequestInstrumentation::new(&InstrumentationConfig::default(), builder.build());
        (instr, capture)
    }

    fn start(instr: &RequestInstrumentation, headers: &HeaderMap) -> Arc<RequestTrace> {
        instr.on_request_start(RequestInfo {
            method: "GET",
            path: "/projects/42",
            route: Some("/projects/{id}"),
            query: Some("page=2&token=abc"),
            headers,
            body: None,
        })
    }

    #[test]
    fn test_entry_event_is_sanitized() {
        let (instr, capture) = instrumentation();
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer s3cr3t"));
        headers.insert("user-agent", HeaderValue::from_static("curl/8"));

        let body = json!({ "name": "demo", "password": "hunter2" });
        let trace = instr.on_request_start(RequestInfo {
            method: "POST",
            path: "/login",
            route: None,
            query: Some("token=abc&next=%2Fhome"),
            headers: &headers,
            body: Some(&body),
        });

        let entries = capture.events_with_context(REQUEST_CONTEXT);
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry["level"], "INFO");
        assert_eq!(entry["correlationId"], trace.correlation_id());
        assert_eq!(entry["data"]["headers"]["authorization"], REDACTED);
        assert_eq!(entry["data"]["headers"]["user-agent"], "curl/8");
        assert_eq!(entry["data"]["query"]["token"], REDACTED);
        assert_eq!(entry["data"]["query"]["next"], "/home");
        assert_eq!(entry["data"]["body"]["password"], REDACTED);
        assert_eq!(entry["data"]["body"]["name"], "demo");

        let raw = capture.all.contents();
        assert!(!raw.contains("s3cr3t"));
        assert!(!raw.contains("hunter2"));
    }

    #[test]
    fn test_exit_logged_exactly_once() {
        let (instr, capture) = instrumentation();
        let trace = start(&instr, &HeaderMap::new());

        assert!(instr.on_body_sent(&trace, 200, Some(b"{\"ok\":true}")));
        assert!(!instr.on_finished(&trace, 200));
        assert!(!instr.on_client_disconnect(&trace, 200));
        assert!(!instr.on_body_sent(&trace, 200, None));

        let exits = capture.events_with_context(RESPONSE_CONTEXT);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0]["data"]["trigger"], "BODY_SENT");
        assert_eq!(exits[0]["data"]["responseBytes"], 11);
        assert_eq!(exits[0]["data"]["path"], "/projects/{id}");
        assert_eq!(exits[0]["correlationId"], trace.correlation_id());
    }

    #[test]
    fn test_client_error_is_warn() {
        let (instr, capture) = instrumentation();
        let trace = start(&instr, &HeaderMap::new());
        instr.on_finished(&trace, 404);

        let exit = &capture.events_with_context(RESPONSE_CONTEXT)[0];
        assert_eq!(exit["level"], "WARN");
        assert_eq!(exit["data"]["outcome"], "CLIENT_ERROR");
        assert!(exit["data"].get("process").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_server_error_attaches_process_state() {
        let (instr, capture) = instrumentation();
        let trace = start(&instr, &HeaderMap::new());

        tokio::time::advance(Duration::from_millis(1200)).await;
        instr.on_finished(&trace, 503);

        let exits = capture.events_with_context(RESPONSE_CONTEXT);
        assert_eq!(exits.len(), 1);
        let exit = &exits[0];
        assert_eq!(exit["level"], LogLevel::Error.as_str());
        assert_eq!(exit["data"]["outcome"], "SERVER_ERROR");
        assert_eq!(exit["data"]["durationMs"], 1200);
        assert!(exit["data"]["process"]["uptimeSecs"].is_u64());
        assert!(exit["data"]["process"]["memoryBytes"].is_u64());

        let stats = instr.logger().performance().stats(Some("GET /projects/{id}"));
        assert_eq!(stats.count, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(capture.performance.json_lines().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_request_records_no_metric() {
        let (instr, _capture) = instrumentation();
        let trace = start(&instr, &HeaderMap::new());

        tokio::time::advance(Duration::from_millis(200)).await;
        instr.on_finished(&trace, 200);

        assert!(instr.logger().performance().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_success_is_warn() {
        let (instr, capture) = instrumentation();
        let trace = start(&instr, &HeaderMap::new());

        tokio::time::advance(Duration::from_millis(3500)).await;
        instr.on_finished(&trace, 200);

        let exit = &capture.events_with_context(RESPONSE_CONTEXT)[0];
        assert_eq!(exit["level"], "WARN");
        assert_eq!(exit["data"]["outcome"], "VERY_SLOW");
    }
}
