//! The event logger service.

use std::error::Error;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::{LoggingConfig, PerformanceConfig};
use crate::config::schema::default_redact_keys;
use crate::logging::event::{ErrorShape, LogEvent, LogLevel};
use crate::logging::redact::Redactor;
use crate::logging::sink::{ConsoleSink, SharedBuffer, Stream, StreamKind};
use crate::logging::LoggerError;
use crate::performance::{Metric, PerformanceRecorder, Timer};

/// Routes events to the console and the persistent streams.
///
/// Routing depends only on the event level. Payloads are redacted on the way
/// out; the event itself is never modified.
pub struct LogRouter {
    min_level: LogLevel,
    console: Option<ConsoleSink>,
    redactor: Redactor,
    streams: Vec<Stream>,
}

/// Wire form of an event: the event with its payload already redacted.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Record<'a> {
    timestamp: DateTime<Local>,
    level: LogLevel,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<&'a str>,
}

impl LogRouter {
    pub fn route(&self, event: &LogEvent) {
        if event.level() < self.min_level {
            return;
        }

        let data = event.data().map(|d| self.redactor.redact(d));

        if let Some(console) = &self.console {
            console.write(event, data.as_ref());
        }

        let record = Record {
            timestamp: event.timestamp(),
            level: event.level(),
            message: event.message(),
            context: event.context(),
            data: data.as_ref(),
            correlation_id: event.correlation_id(),
        };
        self.append_where(|kind| kind.accepts(event.level()), &record);
    }

    /// Append a metric to the performance stream.
    pub fn append_metric(&self, metric: &Metric) {
        let is_performance = |kind: StreamKind| kind == StreamKind::Performance;
        match metric.metadata() {
            Some(metadata) => {
                let redacted = metric.with_metadata(Some(self.redactor.redact(metadata)));
                self.append_where(is_performance, &redacted);
            }
            None => self.append_where(is_performance, metric),
        }
    }

    fn append_where<T: Serialize>(&self, accepts: impl Fn(StreamKind) -> bool, record: &T) {
        let mut targets = self.streams.iter().filter(|s| accepts(s.kind())).peekable();
        if targets.peek().is_none() {
            return;
        }

        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                eprintln!("failed to serialize log record: {}", e);
                return;
            }
        };
        for stream in targets {
            stream.append(&line);
        }
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    pub fn flush(&self) {
        for stream in &self.streams {
            stream.flush();
        }
        let _ = std::io::stdout().flush();
    }
}

/// Handle to the process-wide event logger.
///
/// Cloning is cheap; every clone writes to the same destinations and shares
/// one [`PerformanceRecorder`].
#[derive(Clone)]
pub struct EventLogger {
    router: Arc<LogRouter>,
    performance: PerformanceRecorder,
}

impl EventLogger {
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    /// Build the logger described by the config, creating the log directory.
    pub fn from_config(
        logging: &LoggingConfig,
        performance: &PerformanceConfig,
    ) -> Result<Self, LoggerError> {
        let min_level = logging.level.parse::<LogLevel>()?;
        let mut builder = Self::builder()
            .min_level(min_level)
            .redact_keys(&logging.redact_keys)
            .performance(performance.clone());
        if logging.console {
            builder = builder.console(logging.colorize);
        }
        if let Some(dir) = &logging.directory {
            builder = builder.daily_files(dir, &logging.file_prefix)?;
        }
        Ok(builder.build())
    }

    /// Route a fully built event.
    pub fn log(&self, event: LogEvent) {
        self.router.route(&event);
    }

    pub fn trace(&self, message: impl Into<String>, data: Option<Value>, context: Option<&str>) {
        self.emit(LogLevel::Trace, message, data, context);
    }

    pub fn debug(&self, message: impl Into<String>, data: Option<Value>, context: Option<&str>) {
        self.emit(LogLevel::Debug, message, data, context);
    }

    pub fn info(&self, message: impl Into<String>, data: Option<Value>, context: Option<&str>) {
        self.emit(LogLevel::Info, message, data, context);
    }

    pub fn warn(&self, message: impl Into<String>, data: Option<Value>, context: Option<&str>) {
        self.emit(LogLevel::Warn, message, data, context);
    }

    pub fn error(&self, message: impl Into<String>, data: Option<Value>, context: Option<&str>) {
        self.emit(LogLevel::Error, message, data, context);
    }

    /// Log at FATAL, flush every stream and terminate the process with status 1.
    pub fn fatal(&self, message: impl Into<String>, data: Option<Value>, context: Option<&str>) -> ! {
        self.emit(LogLevel::Fatal, message, data, context);
        self.flush();
        std::process::exit(1);
    }

    /// Log at ERROR with a structured description of `error` under `data.error`.
    pub fn log_error<E: Error + 'static>(&self, message: impl Into<String>, error: &E, context: Option<&str>) {
        self.emit_error_shape(message, ErrorShape::from_error(error), context);
    }

    /// [`log_error`](Self::log_error) for type-erased errors.
    pub fn log_dyn_error(
        &self,
        message: impl Into<String>,
        error: &(dyn Error + 'static),
        context: Option<&str>,
    ) {
        self.emit_error_shape(message, ErrorShape::from_dyn(error), context);
    }

    fn emit_error_shape(&self, message: impl Into<String>, shape: ErrorShape, context: Option<&str>) {
        let data = json!({ "error": shape });
        self.emit(LogLevel::Error, message, Some(data), context);
    }

    fn emit(&self, level: LogLevel, message: impl Into<String>, data: Option<Value>, context: Option<&str>) {
        if level < self.router.min_level() {
            return;
        }
        let mut event = LogEvent::new(level, message);
        if let Some(context) = context {
            event = event.with_context(context);
        }
        if let Some(data) = data {
            event = event.with_data(data);
        }
        self.router.route(&event);
    }

    /// Start timing `operation` on the shared performance recorder.
    pub fn start_timer(&self, operation: impl Into<String>) -> Timer {
        self.performance.start_timer(operation)
    }

    pub fn performance(&self) -> &PerformanceRecorder {
        &self.performance
    }

    pub fn redactor(&self) -> &Redactor {
        self.router.redactor()
    }

    pub fn flush(&self) {
        self.router.flush();
    }

    pub(crate) fn router(&self) -> Arc<LogRouter> {
        self.router.clone()
    }
}

impl fmt::Debug for EventLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLogger")
            .field("min_level", &self.router.min_level)
            .field("console", &self.router.console.is_some())
            .field("streams", &self.router.streams)
            .finish()
    }
}

/// Assembles an [`EventLogger`].
pub struct LoggerBuilder {
    min_level: LogLevel,
    console: Option<ConsoleSink>,
    redactor: Redactor,
    streams: Vec<Stream>,
    performance: PerformanceConfig,
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Trace,
            console: None,
            redactor: Redactor::new(default_redact_keys()),
            streams: Vec::new(),
            performance: PerformanceConfig::default(),
        }
    }
}

impl LoggerBuilder {
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn console(mut self, colorize: bool) -> Self {
        self.console = Some(ConsoleSink::new(colorize));
        self
    }

    /// Replace the redaction deny-list.
    pub fn redact_keys<S: AsRef<str>>(mut self, keys: &[S]) -> Self {
        self.redactor = Redactor::new(keys);
        self
    }

    pub fn performance(mut self, config: PerformanceConfig) -> Self {
        self.performance = config;
        self
    }

    pub fn stream(mut self, kind: StreamKind, writer: impl Write + Send + 'static) -> Self {
        self.streams.push(Stream::new(kind, writer));
        self
    }

    /// Add all four streams as daily-rolling files under `dir`.
    pub fn daily_files(mut self, dir: impl AsRef<Path>, prefix: &str) -> Result<Self, LoggerError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| LoggerError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        for kind in StreamKind::ALL {
            self.streams.push(Stream::daily_file(kind, dir, prefix)?);
        }
        Ok(self)
    }

    /// Add all four streams backed by in-memory buffers.
    pub fn capture(self) -> (Self, StreamCapture) {
        let capture = StreamCapture::default();
        let builder = self
            .stream(StreamKind::All, capture.all.clone())
            .stream(StreamKind::Error, capture.error.clone())
            .stream(StreamKind::Debug, capture.debug.clone())
            .stream(StreamKind::Performance, capture.performance.clone());
        (builder, capture)
    }

    pub fn build(self) -> EventLogger {
        let router = Arc::new(LogRouter {
            min_level: self.min_level,
            console: self.console,
            redactor: self.redactor,
            streams: self.streams,
        });
        let performance = PerformanceRecorder::with_router(&self.performance, router.clone());
        EventLogger { router, performance }
    }
}

/// In-memory copies of the four streams.
#[derive(Debug, Clone, Default)]
pub struct StreamCapture {
    pub all: SharedBuffer,
    pub error: SharedBuffer,
    pub debug: SharedBuffer,
    pub performance: SharedBuffer,
}

impl StreamCapture {
    pub fn stream(&self, kind: StreamKind) -> &SharedBuffer {
        match kind {
            StreamKind::All => &self.all,
            StreamKind::Error => &self.error,
            StreamKind::Debug => &self.debug,
            StreamKind::Performance => &self.performance,
        }
    }

    /// Every event written so far, as JSON.
    pub fn events(&self) -> Vec<Value> {
        self.all.json_lines()
    }

    pub fn events_at(&self, level: LogLevel) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|e| e["level"] == level.as_str())
            .collect()
    }

    pub fn events_with_context(&self, context: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|e| e["context"] == context)
            .collect()
    }
}
