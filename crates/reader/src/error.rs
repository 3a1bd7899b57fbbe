//! Reader Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use pageturn_layout::models::{BookId, ChapterId};

/// A reader error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for reader operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// ### Structural Errors
/// The state has no anchor to work from; nothing was changed.
/// - [`ErrorKind::MissingCurrentChapter`]
/// - [`ErrorKind::MissingPageData`]
/// - [`ErrorKind::UnknownChapter`]
///
/// ### Dependency Errors
/// - [`ErrorKind::ChapterLoad`]
/// - [`ErrorKind::Source`]
/// - [`ErrorKind::Config`]
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("no current chapter")]
    MissingCurrentChapter,
    #[display("no page data for chapter {_0}")]
    MissingPageData(#[error(not(source))] ChapterId),
    /// A chapter id (from a page-count index or saved progress) is not part
    /// of the chapter list.
    #[display("chapter {_0} is not part of this book")]
    UnknownChapter(#[error(not(source))] ChapterId),
    /// Fetching or splitting a chapter through the cache failed.
    #[display("failed to load chapter {_0}")]
    ChapterLoad(#[error(not(source))] ChapterId),
    /// The layout has no measured container yet.
    #[display("layout not ready")]
    LayoutNotReady,
    /// Chapter list could not be fetched.
    #[display("content source error for book {_0}")]
    Source(#[error(not(source))] BookId),
    #[display("book {_0} has no chapters")]
    EmptyBook(#[error(not(source))] BookId),
    #[display("invalid engine configuration")]
    Config,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ChapterLoad(_) | Self::Source(_))
    }
}
