//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! observability core. All types derive Serde traits for deserialization
//! from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings for the host process.
    pub server: ServerConfig,

    /// Event logger destinations and redaction policy.
    pub logging: LoggingConfig,

    /// Performance recorder settings.
    pub performance: PerformanceConfig,

    /// Timeout manager settings.
    pub timeouts: TimeoutManagerConfig,

    /// Request instrumentation thresholds.
    pub instrumentation: InstrumentationConfig,

    /// Prometheus exporter settings.
    pub metrics: MetricsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Event logger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level accepted by the logger (trace, debug, info, warn, error, fatal).
    pub level: String,

    /// `EnvFilter` directives for `tracing` events bridged into the logger.
    /// `RUST_LOG` takes precedence when set.
    pub filter: String,

    /// Directory for the daily log streams. `None` disables persistent streams.
    pub directory: Option<String>,

    /// File name prefix of the persistent streams.
    pub file_prefix: String,

    /// Write human-readable lines to the terminal.
    pub console: bool,

    /// Color console lines by level.
    pub colorize: bool,

    /// Payload keys whose values are replaced before output.
    pub redact_keys: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
            filter: "obs_core=debug,tower_http=info".to_string(),
            directory: Some("logs".to_string()),
            file_prefix: "app".to_string(),
            console: true,
            colorize: true,
            redact_keys: default_redact_keys(),
        }
    }
}

/// Keys redacted from every payload unless configured otherwise.
pub fn default_redact_keys() -> Vec<String> {
    ["password", "token", "apiKey", "secret"]
        .iter()
        .map(|k| k.to_string())
        .collect()
}

/// Performance recorder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Ring buffer capacity (most recent samples kept).
    pub capacity: usize,

    /// Durations above this emit a WARN event.
    pub slow_threshold_ms: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            slow_threshold_ms: 1000,
        }
    }
}

/// Timeout manager configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutManagerConfig {
    /// Interval of the stale-entry sweep in seconds.
    pub sweep_interval_secs: u64,

    /// Entries older than this are force-cancelled by the sweep.
    pub max_age_secs: u64,
}

impl TimeoutManagerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Default for TimeoutManagerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 5 * 60,
            max_age_secs: 60 * 60,
        }
    }
}

/// Request instrumentation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InstrumentationConfig {
    /// Responses slower than this are logged at WARN as `SLOW`.
    pub slow_ms: u64,

    /// Responses slower than this are logged at WARN as `VERY_SLOW`.
    pub very_slow_ms: u64,

    /// Responses slower than this are recorded as performance metrics.
    pub metric_threshold_ms: u64,

    /// Largest JSON request body included in the entry event.
    pub max_logged_body_bytes: usize,

    /// Header names redacted in the entry event, on top of the logger's keys.
    pub redact_headers: Vec<String>,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            slow_ms: 1000,
            very_slow_ms: 3000,
            metric_threshold_ms: 500,
            max_logged_body_bytes: 16 * 1024,
            redact_headers: ["authorization", "cookie", "set-cookie", "x-api-key"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the scrape endpoint.
    pub enabled: bool,

    /// Scrape endpoint bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0:9090".to_string(),
        }
    }
}
