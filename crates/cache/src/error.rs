//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use pageturn_layout::models::ChapterId;

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The content source failed; the source error is attached as a child.
    #[display("failed to fetch chapter {_0}")]
    Fetch(#[error(not(source))] ChapterId),
    /// The layout cannot be paginated yet (container not measured).
    #[display("layout not ready")]
    LayoutNotReady,
    /// A background split task was cancelled or panicked.
    #[display("split task aborted for chapter {_0}")]
    Aborted(#[error(not(source))] ChapterId),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Aborted(_))
    }
}
