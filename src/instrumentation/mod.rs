//! Request instrumentation subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → middleware.rs (buffer small JSON bodies, read matched route)
//!     → hooks.rs on_request_start: RequestTrace + INFO entry event (HTTP_REQUEST)
//!     → handler
//!     → response body wrapped in body.rs (CountingBody)
//!         each data frame → trace byte counter
//!         end of stream / body error / drop before end
//!     → hooks.rs finish (first trigger wins, trace.rs guard)
//!         → outcome.rs classify → exit event (HTTP_RESPONSE)
//!         → server errors: process.rs snapshot attached
//!         → slow requests: performance metric "{METHOD} {route}"
//! ```
//!
//! # Design Decisions
//! - The response is observed through a body decorator, never by patching the writer
//! - Exactly one exit event per request, enforced by an atomic flag on the trace
//! - A request dropped before its response exists still logs one exit, with status 499
//! - The request and response reach the handler and client unchanged

pub mod body;
pub mod correlation;
pub mod hooks;
pub mod middleware;
pub mod outcome;
pub mod process;
pub mod trace;

pub use body::CountingBody;
pub use correlation::new_correlation_id;
pub use hooks::{RequestInfo, RequestInstrumentation, REQUEST_CONTEXT, RESPONSE_CONTEXT};
pub use middleware::{instrument, instrument_requests, CLIENT_CLOSED_REQUEST, X_CORRELATION_ID};
pub use outcome::{ExitTrigger, ResponseOutcome};
pub use process::ProcessSnapshot;
pub use trace::RequestTrace;
