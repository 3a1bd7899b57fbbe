//! Source Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A content-source or persistence error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for source operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The book or chapter does not exist upstream.
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Network-related failure talking to the upstream source.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The operation did not finish within its timeout.
    #[display("source unavailable: timed out after {_0}ms")]
    Unavailable(#[error(not(source))] u64),
    /// Source-specific failure.
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
    /// Stored data could not be (de)serialised.
    #[display("invalid stored data: {_0}")]
    InvalidData(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Unavailable(_) | Self::BackendError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::NotFound("c1".to_string()), false)]
    #[case(ErrorKind::Network("reset".to_string()), true)]
    #[case(ErrorKind::Unavailable(500), true)]
    #[case(ErrorKind::BackendError("500".to_string()), true)]
    #[case(ErrorKind::InvalidData("eof".to_string()), false)]
    fn test_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::Unavailable(250).to_string(), "source unavailable: timed out after 250ms");
    }
}
