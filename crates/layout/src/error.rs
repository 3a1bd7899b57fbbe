//! Layout Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Every crate in the workspace follows
//! the same `Error`/`Result`/`ErrorKind` layout.

use crate::models::ContainerSize;
use derive_more::{Display, Error};

/// A layout error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for layout operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The page area has not been measured yet (or was measured as empty).
    /// Callers should wait for a real size instead of paginating.
    #[display("invalid container size: {_0}")]
    InvalidContainer(#[error(not(source))] ContainerSize),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Splitting is deterministic; the same layout fails the same way.
        false
    }
}
