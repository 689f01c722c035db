//! Shared error type across meterline crates.

use thiserror::Error;

/// Stable error codes, used as log fields and in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Configuration failed to parse or validate.
    BadConfig,
    /// Unsupported config schema version.
    UnsupportedVersion,
    /// Metric update used label names the family was not created with.
    LabelMismatch,
    /// Metric family refused a new series.
    CardinalityExceeded,
    /// I/O failure (config read, socket bind).
    Io,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadConfig => "BAD_CONFIG",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::LabelMismatch => "LABEL_MISMATCH",
            ErrorCode::CardinalityExceeded => "CARDINALITY_EXCEEDED",
            ErrorCode::Io => "IO",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MeterlineError>;

/// Unified error type used by core and server.
#[derive(Debug, Error)]
pub enum MeterlineError {
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("unsupported config version: {0}")]
    UnsupportedVersion(u32),
    #[error("metric {metric}: expected labels {expected:?}, got {got:?}")]
    LabelMismatch {
        metric: String,
        expected: Vec<String>,
        got: Vec<String>,
    },
    #[error("metric {metric}: series limit {limit} reached")]
    CardinalityExceeded { metric: String, limit: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl MeterlineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MeterlineError::BadConfig(_) => ErrorCode::BadConfig,
            MeterlineError::UnsupportedVersion(_) => ErrorCode::UnsupportedVersion,
            MeterlineError::LabelMismatch { .. } => ErrorCode::LabelMismatch,
            MeterlineError::CardinalityExceeded { .. } => ErrorCode::CardinalityExceeded,
            MeterlineError::Io(_) => ErrorCode::Io,
        }
    }

    /// Metric family a rejected update was aimed at.
    pub fn metric(&self) -> Option<&str> {
        match self {
            MeterlineError::LabelMismatch { metric, .. }
            | MeterlineError::CardinalityExceeded { metric, .. } => Some(metric),
            _ => None,
        }
    }
}
