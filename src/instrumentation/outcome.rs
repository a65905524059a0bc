//! Response classification.

use std::fmt;

use serde::Serialize;

use crate::logging::LogLevel;

/// Category of a finished request, by status first and duration second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseOutcome {
    ServerError,
    ClientError,
    VerySlow,
    Slow,
    Normal,
}

impl ResponseOutcome {
    pub fn classify(status: u16, duration_ms: u64, slow_ms: u64, very_slow_ms: u64) -> Self {
        if status >= 500 {
            Self::ServerError
        } else if status >= 400 {
            Self::ClientError
        } else if duration_ms > very_slow_ms {
            Self::VerySlow
        } else if duration_ms > slow_ms {
            Self::Slow
        } else {
            Self::Normal
        }
    }

    pub fn level(self) -> LogLevel {
        match self {
            Self::ServerError => LogLevel::Error,
            Self::ClientError | Self::VerySlow | Self::Slow => LogLevel::Warn,
            Self::Normal => LogLevel::Info,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServerError => "SERVER_ERROR",
            Self::ClientError => "CLIENT_ERROR",
            Self::VerySlow => "VERY_SLOW",
            Self::Slow => "SLOW",
            Self::Normal => "NORMAL",
        }
    }
}

impl fmt::Display for ResponseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which exit path ended the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitTrigger {
    /// The host explicitly reported the body as sent.
    BodySent,
    /// The response body reached end of stream.
    Finished,
    /// The connection went away before the body was complete.
    ClientDisconnect,
    /// The response body yielded an error.
    BodyError,
}
