//! Axum middleware driving the instrumentation hooks.
//!
//! The exit event fires from [`CountingBody`] once a response exists. Until
//! then an [`ExitGuard`] owns the trace, so a request whose future is dropped
//! mid-handler (the client went away) still logs its exit.

use std::sync::Arc;

use axum::{
    body::{Body, BodyDataStream},
    extract::{MatchedPath, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    Router,
};
use bytes::{Bytes, BytesMut};
use futures_util::{stream, StreamExt};
use serde_json::Value;

use crate::instrumentation::body::CountingBody;
use crate::instrumentation::hooks::{RequestInfo, RequestInstrumentation};
use crate::instrumentation::trace::RequestTrace;

pub const X_CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");

/// Status logged for requests abandoned before a response was produced.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Wrap every route of `router` with request instrumentation.
pub fn instrument<S>(router: Router<S>, instrumentation: RequestInstrumentation) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(instrumentation, instrument_requests))
}

/// Log entry and exit of each request and count its response bytes.
///
/// The [`RequestTrace`] is placed in the request extensions, and the
/// correlation id is returned in the `x-correlation-id` header.
pub async fn instrument_requests(
    State(instrumentation): State<RequestInstrumentation>,
    matched_path: Option<MatchedPath>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let max_body = instrumentation.config().max_logged_body_bytes;

    let (logged_body, body) = if loggable_json(&parts.headers, max_body) {
        buffer_json(body, max_body).await
    } else {
        (None, body)
    };

    let trace = instrumentation.on_request_start(RequestInfo {
        method: parts.method.as_str(),
        path: parts.uri.path(),
        route: matched_path.as_ref().map(MatchedPath::as_str),
        query: parts.uri.query(),
        headers: &parts.headers,
        body: logged_body.as_ref(),
    });
    let guard = ExitGuard::new(trace.clone(), instrumentation.clone());

    parts.extensions.insert(trace);
    let response = next.run(Request::from_parts(parts, body)).await;

    let trace = guard.disarm();
    finish_response(response, trace, instrumentation)
}

/// Logs a client-disconnect exit if dropped while still armed.
struct ExitGuard {
    trace: Arc<RequestTrace>,
    instrumentation: RequestInstrumentation,
    armed: bool,
}

impl ExitGuard {
    fn new(trace: Arc<RequestTrace>, instrumentation: RequestInstrumentation) -> Self {
        Self {
            trace,
            instrumentation,
            armed: true,
        }
    }

    /// Hand the trace on to whoever logs the exit from here.
    fn disarm(mut self) -> Arc<RequestTrace> {
        self.armed = false;
        self.trace.clone()
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if self.armed {
            self.instrumentation
                .on_client_disconnect(&self.trace, CLIENT_CLOSED_REQUEST);
        }
    }
}

fn finish_response(
    response: Response,
    trace: Arc<RequestTrace>,
    instrumentation: RequestInstrumentation,
) -> Response {
    let (mut parts, body) = response.into_parts();
    if let Ok(value) = HeaderValue::from_str(trace.correlation_id()) {
        parts.headers.insert(X_CORRELATION_ID, value);
    }
    let status = parts.status.as_u16();
    let body = Body::new(CountingBody::new(body, trace, instrumentation, status));
    Response::from_parts(parts, body)
}

/// Read up to `max` bytes of a JSON body for logging.
///
/// The returned body always carries the same frames the client sent. If the
/// stream fails or runs past `max`, nothing is logged and the chunks read so
/// far are replayed ahead of the rest, error included, so the handler sees
/// exactly what it would have seen without instrumentation.
async fn buffer_json(body: Body, max: usize) -> (Option<Value>, Body) {
    let mut data = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut len = 0;

    while let Some(next) = data.next().await {
        match next {
            Ok(chunk) => {
                len += chunk.len();
                chunks.push(chunk);
                if len > max {
                    return (None, replay(chunks, None, data));
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Request body not logged: read failed");
                return (None, replay(chunks, Some(e), data));
            }
        }
    }

    let mut buf = BytesMut::with_capacity(len);
    for chunk in &chunks {
        buf.extend_from_slice(chunk);
    }
    let bytes = buf.freeze();
    (serde_json::from_slice::<Value>(&bytes).ok(), Body::from(bytes))
}

fn replay(chunks: Vec<Bytes>, error: Option<axum::Error>, rest: BodyDataStream) -> Body {
    let head = stream::iter(chunks.into_iter().map(Ok)).chain(stream::iter(error.map(Err)));
    Body::from_stream(head.chain(rest))
}

/// Only JSON bodies with a declared length within `max` are buffered.
fn loggable_json(headers: &HeaderMap, max: usize) -> bool {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.starts_with("application/json"));
    let length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    is_json && matches!(length, Some(len) if len > 0 && len <= max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentationConfig;
    use crate::instrumentation::hooks::{REQUEST_CONTEXT, RESPONSE_CONTEXT};
    use crate::logging::{EventLogger, LogLevel, StreamCapture};
    use axum::extract::Extension;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::Json;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> (Router, StreamCapture) {
        let (builder, capture) = EventLogger::builder().capture();
        let instr = RequestInstrumentation::new(&InstrumentationConfig::default(), builder.build());

        let router = Router::new()
            .route("/items/{id}", get(|| async { "item" }))
            .route("/echo", post(|Json(v): Json<Value>| async move { Json(v) }))
            .route(
                "/trace",
                get(|Extension(trace): Extension<Arc<RequestTrace>>| async move {
                    trace.correlation_id().to_string()
                }),
            )
            .route(
                "/stuck",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    "late"
                }),
            )
            .route(
                "/unavailable",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(1200)).await;
                    (StatusCode::SERVICE_UNAVAILABLE, "down")
                }),
            );
        (instrument(router, instr), capture)
    }

    async fn call(router: Router, request: axum::http::Request<Body>) -> (StatusCode, HeaderMap, String) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get_request(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_entry_and_exit_share_correlation_id() {
        let (router, capture) = app();
        let (status, headers, body) = call(router, get_request("/items/7?verbose=1")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "item");

        let entry = &capture.events_with_context(REQUEST_CONTEXT)[0];
        let exit = &capture.events_with_context(RESPONSE_CONTEXT)[0];
        let cid = headers[X_CORRELATION_ID].to_str().unwrap();
        assert_eq!(entry["correlationId"], cid);
        assert_eq!(exit["correlationId"], cid);
        assert_eq!(entry["data"]["route"], "/items/{id}");
        assert_eq!(entry["data"]["query"]["verbose"], "1");
        assert_eq!(exit["data"]["responseBytes"], 4);
        assert_eq!(exit["level"], "INFO");
    }

    #[tokio::test]
    async fn test_trace_is_visible_to_handlers() {
        let (router, _capture) = app();
        let (_, headers, body) = call(router, get_request("/trace")).await;
        assert_eq!(headers[X_CORRELATION_ID].to_str().unwrap(), body);
    }

    #[tokio::test]
    async fn test_json_body_is_logged_redacted_and_forwarded() {
        let (router, capture) = app();
        let payload = r#"{"user":"ada","password":"pw-abc-1","nested":{"token":"tok-xyz-2"}}"#;
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/echo")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, payload.len())
            .body(Body::from(payload))
            .unwrap();

        let (status, _, body) = call(router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("pw-abc-1"));

        let entry = &capture.events_with_context(REQUEST_CONTEXT)[0];
        assert_eq!(entry["data"]["body"]["user"], "ada");
        let persisted = capture.all.contents();
        assert!(!persisted.contains("pw-abc-1"));
        assert!(!persisted.contains("tok-xyz-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_server_error_response() {
        let (router, capture) = app();
        let (status, _, _) = call(router, get_request("/unavailable")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let exits = capture.events_with_context(RESPONSE_CONTEXT);
        assert_eq!(exits.len(), 1);
        let exit = &exits[0];
        assert_eq!(exit["level"], LogLevel::Error.as_str());
        assert!(exit["data"]["durationMs"].as_u64().unwrap() >= 1200);
        assert!(exit["data"]["process"]["memoryBytes"].is_u64());
        assert!(exit["data"]["process"]["uptimeSecs"].is_u64());
        assert_eq!(capture.performance.json_lines()[0]["operation"], "GET /unavailable");
    }

    #[tokio::test]
    async fn test_unmatched_route_is_client_error() {
        let (router, capture) = app();
        let (status, _, _) = call(router, get_request("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let exits = capture.events_with_context(RESPONSE_CONTEXT);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0]["data"]["outcome"], "CLIENT_ERROR");
    }

    #[test]
    fn test_loggable_json() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        assert!(!loggable_json(&headers, 100));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        assert!(loggable_json(&headers, 100));
        assert!(!loggable_json(&headers, 10));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!loggable_json(&headers, 100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_before_response_logs_one_exit() {
        let (router, capture) = app();
        let abandoned =
            tokio::time::timeout(Duration::from_millis(100), router.oneshot(get_request("/stuck")))
                .await;
        assert!(abandoned.is_err());

        assert_eq!(capture.events_with_context(REQUEST_CONTEXT).len(), 1);
        let exits = capture.events_with_context(RESPONSE_CONTEXT);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0]["data"]["trigger"], "CLIENT_DISCONNECT");
        assert_eq!(exits[0]["data"]["statusCode"], CLIENT_CLOSED_REQUEST);
        assert_eq!(exits[0]["data"]["responseBytes"], 0);
        assert_eq!(
            exits[0]["correlationId"],
            capture.events_with_context(REQUEST_CONTEXT)[0]["correlationId"]
        );
    }

    #[tokio::test]
    async fn test_completed_request_is_not_a_disconnect() {
        let (router, capture) = app();
        call(router, get_request("/items/1")).await;

        let exits = capture.events_with_context(RESPONSE_CONTEXT);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0]["data"]["trigger"], "FINISHED");
    }

    #[tokio::test]
    async fn test_failed_body_read_reaches_handler_unchanged() {
        let (builder, capture) = EventLogger::builder().capture();
        let instr = RequestInstrumentation::new(&InstrumentationConfig::default(), builder.build());
        let router = instrument(
            Router::new().route(
                "/upload",
                post(|body: Body| async move {
                    match axum::body::to_bytes(body, usize::MAX).await {
                        Ok(bytes) => (StatusCode::OK, format!("{} bytes", bytes.len())),
                        Err(_) => (StatusCode::IM_A_TEAPOT, "handler saw the error".to_string()),
                    }
                }),
            ),
            instr,
        );

        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"{\"partial\":")),
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated")),
        ];
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/upload")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, 64)
            .body(Body::from_stream(futures_util::stream::iter(chunks)))
            .unwrap();

        let (status, _, body) = call(router, request).await;
        assert_eq!(status, StatusCode::IM_A_TEAPOT);
        assert_eq!(body, "handler saw the error");

        let entry = &capture.events_with_context(REQUEST_CONTEXT)[0];
        assert!(entry["data"].get("body").is_none());
    }

    #[tokio::test]
    async fn test_body_longer_than_declared_is_forwarded_whole() {
        let (builder, _capture) = EventLogger::builder().capture();
        let config = InstrumentationConfig {
            max_logged_body_bytes: 8,
            ..InstrumentationConfig::default()
        };
        let instr = RequestInstrumentation::new(&config, builder.build());
        let router = instrument(
            Router::new().route("/echo", post(|body: String| async move { body })),
            instr,
        );

        let payload = r#"{"message":"longer than declared"}"#;
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"{\"message\":")),
            Ok(Bytes::from_static(b"\"longer than declared\"}")),
        ];
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/echo")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, 4)
            .body(Body::from_stream(futures_util::stream::iter(chunks)))
            .unwrap();

        let (status, _, body) = call(router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, payload);
    }
}
