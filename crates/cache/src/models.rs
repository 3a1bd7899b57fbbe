use pageturn_layout::models::{BookInfo, Chapter, ChapterPosition, PageData};
use std::sync::Arc;

/// A chapter resident in the cache.
///
/// `content` is kept alongside the split pages so that a layout change can
/// re-split without going back to the source.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedChapter {
    pub index: usize,
    pub chapter: Chapter,
    pub content: Arc<str>,
    /// Split pages for the layout they were last built with, if any.
    pub page_data: Option<Arc<PageData>>,
}

/// Everything the cache needs to know about a chapter to build its pages.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterTarget {
    pub chapter: Chapter,
    pub position: ChapterPosition,
    pub book_info: Option<Arc<BookInfo>>,
}
impl ChapterTarget {
    /// Target for the chapter at `index`, or `None` if out of range.
    pub fn at(chapters: &[Chapter], index: usize, book_info: Option<Arc<BookInfo>>) -> Option<Self> {
        let chapter = chapters.get(index)?.clone();
        Some(Self {
            chapter,
            position: ChapterPosition::new(index, chapters.len()),
            book_info,
        })
    }

    pub fn index(&self) -> usize {
        self.position.index
    }
}

/// Outcome of a background preload request.
#[derive(Debug, Clone, PartialEq)]
pub enum Preloaded {
    /// Valid page data was already resident; nothing was fetched.
    Cached(Arc<PageData>),
    /// Another request for the same chapter is running; this one did nothing.
    InFlight,
    /// The chapter was fetched (or re-split) and inserted.
    Loaded(Arc<PageData>),
    /// The container is not measured yet: the text was fetched and stored,
    /// pages follow once there is a layout to split for.
    Fetched,
}
impl Preloaded {
    pub fn page_data(&self) -> Option<&Arc<PageData>> {
        match self {
            Self::Cached(data) | Self::Loaded(data) => Some(data),
            Self::InFlight | Self::Fetched => None,
        }
    }
}
