//! Error types for parsing registry and wire-level values.

use thiserror::Error;

/// Errors that can occur when parsing sensor metadata or wire values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Interval tag outside the supported sampling cadences.
    ///
    /// Sensors carrying such a tag are a registry defect; they are reported
    /// and excluded from synchronization until the registry is corrected.
    #[error("unsupported sampling interval '{0}' (expected PT1M, PT10M, PT30M or PT1H)")]
    UnsupportedInterval(String),

    /// Timestamp outside the representable range.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Result type alias using [`ParseError`].
pub type ParseResult<T> = std::result::Result<T, ParseError>;
