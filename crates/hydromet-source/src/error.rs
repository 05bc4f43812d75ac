//! Error types for the remote measurement service client.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using this crate's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the remote measurement service.
///
/// Marked `#[non_exhaustive]` so new variants can be added without breaking
/// downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Transport-level failure reaching the service.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success HTTP status.
    #[error("remote service returned status {status} for '{operation}'")]
    Status {
        /// The operation that failed.
        operation: &'static str,
        /// The HTTP status code.
        status: u16,
    },

    /// The service reported an application-level error body.
    #[error("remote service error: {0}")]
    Remote(String),

    /// Response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Operation timed out.
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
        /// The timeout duration.
        duration: Duration,
    },

    /// Invalid client configuration.
    #[error("invalid source configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: &'static str, duration: Duration) -> Self {
        Self::Timeout {
            operation,
            duration,
        }
    }

    /// Create a malformed-response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Status {
            operation: "search",
            status: 503,
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("search"));

        let err = Error::timeout("num_results", Duration::from_secs(30));
        assert!(err.to_string().contains("num_results"));

        let err = Error::malformed("missing field `result`");
        assert!(err.to_string().contains("result"));
    }
}
