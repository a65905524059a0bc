//! Performance measurement subsystem.
//!
//! # Data Flow
//! ```text
//! monitor() / start_timer() / record()
//!     → recorder.rs (time the work, keep its result)
//!     → buffer.rs (bounded FIFO of samples)
//!     → performance log stream (one JSON line per sample)
//!     → export.rs (metrics facade → Prometheus)
//!     → WARN event when slower than the threshold
//!
//! Health consumers:
//!     → stats() / slow_operations_report() (read-only snapshots)
//! ```

pub mod buffer;
pub mod export;
pub mod recorder;

pub use buffer::{Metric, OperationStats, SlowOperation};
pub use recorder::{PerformanceRecorder, Timer};
