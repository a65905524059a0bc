//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities > 0, thresholds ordered)
//! - Validate level names and addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::logging::LogLevel;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("logging.level: unknown level {0:?}")]
    UnknownLevel(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("instrumentation.very_slow_ms ({very_slow}) must not be below slow_ms ({slow})")]
    SlowThresholdOrder { slow: u64, very_slow: u64 },

    #[error("timeouts.max_age_secs ({max_age}) must not be below sweep_interval_secs ({interval})")]
    SweepLongerThanMaxAge { interval: u64, max_age: u64 },

    #[error("logging.file_prefix must not be empty when a directory is set")]
    EmptyFilePrefix,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "server.bind_address",
            value: config.server.bind_address.clone(),
        });
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero("server.request_timeout_secs"));
    }

    if config.logging.level.parse::<LogLevel>().is_err() {
        errors.push(ValidationError::UnknownLevel(config.logging.level.clone()));
    }
    if config.logging.directory.is_some() && config.logging.file_prefix.trim().is_empty() {
        errors.push(ValidationError::EmptyFilePrefix);
    }

    if config.performance.capacity == 0 {
        errors.push(ValidationError::Zero("performance.capacity"));
    }

    let timeouts = &config.timeouts;
    if timeouts.sweep_interval_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.sweep_interval_secs"));
    }
    if timeouts.max_age_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.max_age_secs"));
    } else if timeouts.max_age_secs < timeouts.sweep_interval_secs {
        errors.push(ValidationError::SweepLongerThanMaxAge {
            interval: timeouts.sweep_interval_secs,
            max_age: timeouts.max_age_secs,
        });
    }

    let instr = &config.instrumentation;
    if instr.very_slow_ms < instr.slow_ms {
        errors.push(ValidationError::SlowThresholdOrder {
            slow: instr.slow_ms,
            very_slow: instr.very_slow_ms,
        });
    }

    if config.metrics.enabled && config.metrics.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "metrics.address",
            value: config.metrics.address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
