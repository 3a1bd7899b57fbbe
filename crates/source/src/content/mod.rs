//! Content source trait and implementations.
//!
//! This module defines the `ContentSource` trait, the engine's only way of
//! getting book data. Hosts implement it over whatever they fetch from
//! (network API, local database, bundled files).

#[cfg(any(test, feature = "mock"))]
mod mock;
mod resilient;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockSource;
pub use self::resilient::{ResilientSource, RetryPolicy};
use crate::error::Result;
use crate::models::ChapterContent;
use async_trait::async_trait;
use pageturn_layout::models::{BookId, BookInfo, Chapter, ChapterId};

/// Upstream provider of chapter lists, chapter text and book metadata.
///
/// Every method may fail with network or storage errors; the engine treats
/// failures as recoverable (retried through [`ResilientSource`], logged on
/// background paths, surfaced on foreground paths). Implementations must not
/// cache on the engine's behalf; caching is the engine's job.
///
/// # Examples
///
/// ```
/// use pageturn_layout::models::{BookId, Chapter};
/// use pageturn_source::{content::ContentSource, error::Result};
///
/// async fn first_chapter(source: &dyn ContentSource, book: &BookId) -> Result<Option<Chapter>> {
///     Ok(source.chapter_list(book).await?.into_iter().next())
/// }
/// ```
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Name of the source, used for logging only.
    fn name(&self) -> &str;

    /// Ordered chapter list for a book. Fetched once per reading session.
    async fn chapter_list(&self, book: &BookId) -> Result<Vec<Chapter>>;

    /// Text of a single chapter.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the chapter
    /// does not exist.
    async fn chapter_content(&self, chapter: &ChapterId) -> Result<ChapterContent>;

    /// Book metadata for the detail page.
    async fn book_info(&self, book: &BookId) -> Result<BookInfo>;
}
