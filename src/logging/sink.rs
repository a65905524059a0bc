//! Log destinations.
//!
//! # Responsibilities
//! - Render events as colored human-readable lines on the console
//! - Append JSON lines to the persistent streams
//! - Contain write failures: report once, never propagate
//!
//! # Design Decisions
//! - Each stream owns its writer behind a mutex, so lines never interleave
//! - Persistent streams roll over daily via `tracing-appender`
//! - Any `io::Write` can back a stream (files in production, buffers in tests)

use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;
use colored::{ColoredString, Colorize};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::logging::event::{LogEvent, LogLevel};
use crate::logging::LoggerError;

/// The persistent streams an event can be appended to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Every event.
    All,
    /// ERROR and FATAL events.
    Error,
    /// DEBUG and TRACE events.
    Debug,
    /// Recorded performance metrics.
    Performance,
}

impl StreamKind {
    pub const ALL: [StreamKind; 4] = [
        StreamKind::All,
        StreamKind::Error,
        StreamKind::Debug,
        StreamKind::Performance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::All => "all",
            StreamKind::Error => "error",
            StreamKind::Debug => "debug",
            StreamKind::Performance => "performance",
        }
    }

    /// Whether an event at `level` is appended to this stream.
    pub fn accepts(self, level: LogLevel) -> bool {
        match self {
            StreamKind::All => true,
            StreamKind::Error => level.is_error(),
            StreamKind::Debug => level.is_debug(),
            StreamKind::Performance => false,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An append-only line stream.
pub struct Stream {
    kind: StreamKind,
    writer: Mutex<Box<dyn Write + Send>>,
    failing: AtomicBool,
}

impl Stream {
    pub fn new(kind: StreamKind, writer: impl Write + Send + 'static) -> Self {
        Self {
            kind,
            writer: Mutex::new(Box::new(writer)),
            failing: AtomicBool::new(false),
        }
    }

    /// A stream backed by a daily-rolling file `<prefix>-<kind>.<date>.log` in `dir`.
    pub fn daily_file(kind: StreamKind, dir: &Path, prefix: &str) -> Result<Self, LoggerError> {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(format!("{}-{}", prefix, kind))
            .filename_suffix("log")
            .build(dir)
            .map_err(|source| LoggerError::Appender { kind, source })?;
        Ok(Self::new(kind, appender))
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Append one line. Failures are reported on stderr the first time they
    /// occur and then stay silent until a write succeeds again.
    pub fn append(&self, line: &str) {
        let result = {
            let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            write_line(&mut **writer, line)
        };

        match result {
            Ok(()) => {
                self.failing.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                if !self.failing.swap(true, Ordering::Relaxed) {
                    report_sink_failure(self.kind, &e);
                }
            }
        }
    }

    pub fn flush(&self) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writer.flush() {
            if !self.failing.swap(true, Ordering::Relaxed) {
                report_sink_failure(self.kind, &e);
            }
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("kind", &self.kind)
            .field("failing", &self.failing.load(Ordering::Relaxed))
            .finish()
    }
}

fn write_line(writer: &mut dyn Write, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")
}

fn report_sink_failure(kind: StreamKind, error: &io::Error) {
    eprintln!(
        "{} failed to write to the {} log stream: {} (continuing with remaining destinations)",
        Local::now().format(TIME_FORMAT),
        kind,
        error
    );
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Human-readable terminal output.
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    colorize: bool,
}

impl ConsoleSink {
    pub fn new(colorize: bool) -> Self {
        Self { colorize }
    }

    /// `2026-10-16 09:12:44.120 INFO  [HTTP_REQUEST] GET /health (cid=...) {"k":"v"}`
    ///
    /// `data` is passed in already redacted.
    pub fn render(&self, event: &LogEvent, data: Option<&serde_json::Value>) -> String {
        let mut line = format!(
            "{} {}",
            event.timestamp().format(TIME_FORMAT),
            self.paint(event.level())
        );
        if let Some(context) = event.context() {
            line.push_str(&format!(" [{}]", context));
        }
        line.push(' ');
        line.push_str(event.message());
        if let Some(cid) = event.correlation_id() {
            line.push_str(&format!(" (cid={})", cid));
        }
        if let Some(data) = data {
            line.push(' ');
            line.push_str(&data.to_string());
        }
        line
    }

    pub fn write(&self, event: &LogEvent, data: Option<&serde_json::Value>) {
        let line = self.render(event, data);
        // A closed stdout must not take the process down.
        let _ = if event.level().is_error() {
            writeln!(io::stderr().lock(), "{}", line)
        } else {
            writeln!(io::stdout().lock(), "{}", line)
        };
    }

    fn paint(&self, level: LogLevel) -> ColoredString {
        let label = format!("{:<5}", level.as_str());
        let label = label.as_str();
        if !self.colorize {
            return label.normal();
        }
        match level {
            LogLevel::Trace => label.dimmed(),
            LogLevel::Debug => label.blue(),
            LogLevel::Info => label.green(),
            LogLevel::Warn => label.yellow(),
            LogLevel::Error => label.red(),
            LogLevel::Fatal => label.white().on_red().bold(),
        }
    }
}

/// A cloneable in-memory writer, used to capture stream output.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let bytes = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Every line parsed as JSON; unparseable lines are skipped.
    pub fn json_lines(&self) -> Vec<serde_json::Value> {
        self.contents()
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    #[test]
    fn test_stream_routing_by_level() {
        assert!(StreamKind::All.accepts(LogLevel::Trace));
        assert!(StreamKind::Error.accepts(LogLevel::Fatal));
        assert!(!StreamKind::Error.accepts(LogLevel::Warn));
        assert!(StreamKind::Debug.accepts(LogLevel::Trace));
        assert!(!StreamKind::Debug.accepts(LogLevel::Info));
        assert!(!StreamKind::Performance.accepts(LogLevel::Error));
    }

    #[test]
    fn test_failing_stream_does_not_panic() {
        let stream = Stream::new(StreamKind::All, BrokenWriter);
        stream.append("first");
        stream.append("second");
        stream.flush();
        assert!(stream.failing.load(Ordering::Relaxed));
    }

    #[test]
    fn test_shared_buffer_lines() {
        let buffer = SharedBuffer::new();
        let stream = Stream::new(StreamKind::All, buffer.clone());
        stream.append(r#"{"a":1}"#);
        stream.append("not json");
        stream.append(r#"{"a":2}"#);

        let lines = buffer.json_lines();
        assert_eq!(lines, vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[test]
    fn test_console_render_plain() {
        let sink = ConsoleSink::new(false);
        let event = LogEvent::new(LogLevel::Warn, "slow")
            .with_context("PERFORMANCE")
            .with_correlation_id("c1");
        let line = sink.render(&event, Some(&json!({"ms": 1200})));

        assert!(line.contains("WARN  [PERFORMANCE] slow (cid=c1) {\"ms\":1200}"));
    }

    #[test]
    fn test_daily_file_stream() {
        let dir = tempfile::tempdir().unwrap();
        let stream = Stream::daily_file(StreamKind::Error, dir.path(), "app").unwrap();
        stream.append(r#"{"level":"ERROR"}"#);
        stream.flush();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("app-error"));
        assert!(names[0].ends_with(".log"));
    }
}
