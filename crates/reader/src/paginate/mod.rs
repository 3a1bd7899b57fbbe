//! Whole-book page counting.
//!
//! The global page index maps an absolute page number to a chapter and a
//! page within it. It is only needed for whole-book progress and seeking, so
//! it is built in the background and may be missing at any time.

mod service;
mod stream;

pub use self::service::{PaginationJob, PaginationService};
pub use self::stream::build_global_index;

use pageturn_config::{IoConfig, PaginationConfig};
use pageturn_layout::models::{ChapterId, PageCountCacheData};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Progress events emitted by [`build_global_index`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once.
/// 2. Either [`Skipped`](Self::Skipped), after which the stream ends, or
///    [`DiscoveryComplete`](Self::DiscoveryComplete) with the chapter count.
/// 3. [`Counted`](Self::Counted), once per chapter, in completion order.
/// 4. [`Complete`](Self::Complete), only if every chapter was counted.
#[derive(Debug, Clone, PartialEq)]
pub enum PaginationEvent {
    Started,
    /// A valid index for this book and layout already exists.
    Skipped(Arc<PageCountCacheData>),
    DiscoveryComplete(usize),
    Counted { index: usize, chapter_id: ChapterId, pages: usize },
    Complete(PageCountCacheData),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaginationOptions {
    /// Chapters fetched and split at the same time.
    pub concurrency: usize,
    /// Extra attempts for a chapter whose fetch failed with a retryable
    /// error.
    pub retries: u32,
    pub retry_delay: Duration,
    /// Previously built index; reused when still valid.
    pub existing: Option<Arc<PageCountCacheData>>,
}
impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retries: 1,
            retry_delay: Duration::from_millis(200),
            existing: None,
        }
    }
}
impl PaginationOptions {
    pub fn from_config(pagination: &PaginationConfig, io: &IoConfig) -> Self {
        Self {
            concurrency: pagination.concurrency,
            retries: io.retries,
            retry_delay: io.retry_delay(),
            existing: None,
        }
    }
}
