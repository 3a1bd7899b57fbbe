use super::{BookInfo, ChapterId, LayoutKey};
use std::sync::Arc;

/// Position of the reading cursor inside a chapter.
///
/// `BookDetail` is the book detail pseudo-page shown in front of the first
/// chapter; hosts that store positions as integers use `-1` for it (see
/// [`as_raw()`](Self::as_raw)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PagePosition {
    BookDetail,
    Page(usize),
}
impl PagePosition {
    pub fn from_raw(raw: i64) -> Self {
        match usize::try_from(raw) {
            Ok(index) => Self::Page(index),
            Err(_) => Self::BookDetail,
        }
    }

    pub fn as_raw(&self) -> i64 {
        match self {
            Self::BookDetail => -1,
            Self::Page(index) => i64::try_from(*index).unwrap_or(i64::MAX),
        }
    }

    /// Page index, with the detail page treated as the start of the chapter.
    pub fn page_or_first(&self) -> usize {
        match self {
            Self::BookDetail => 0,
            Self::Page(index) => *index,
        }
    }
}
impl Default for PagePosition {
    fn default() -> Self {
        Self::Page(0)
    }
}

/// Where a chapter sits in the book's chapter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterPosition {
    pub index: usize,
    pub total: usize,
}
impl ChapterPosition {
    pub fn new(index: usize, total: usize) -> Self {
        Self { index, total }
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.total
    }
}

/// A chapter split into screen pages for one specific layout.
///
/// Immutable once built and shared as `Arc<PageData>`. Neighbouring chapters
/// can be attached as context, but only one level deep: attached neighbours
/// never carry neighbours of their own.
#[derive(Debug, Clone, PartialEq)]
pub struct PageData {
    pub chapter_id: ChapterId,
    pub pages: Vec<String>,
    pub is_first_chapter: bool,
    pub is_last_chapter: bool,
    pub has_book_detail_page: bool,
    pub book_info: Option<Arc<BookInfo>>,
    pub previous: Option<Arc<PageData>>,
    pub next: Option<Arc<PageData>>,
    pub layout: LayoutKey,
}
impl PageData {
    pub fn new(
        chapter_id: ChapterId,
        pages: Vec<String>,
        position: ChapterPosition,
        book_info: Option<Arc<BookInfo>>,
        layout: LayoutKey,
    ) -> Self {
        let has_book_detail_page = position.is_first() && book_info.is_some();
        Self {
            chapter_id,
            pages,
            is_first_chapter: position.is_first(),
            is_last_chapter: position.is_last(),
            has_book_detail_page,
            book_info,
            previous: None,
            next: None,
            layout,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn last_page_index(&self) -> usize {
        self.pages.len().saturating_sub(1)
    }

    pub fn page(&self, index: usize) -> Option<&str> {
        self.pages.get(index).map(String::as_str)
    }

    /// Whether `index` is the first or last page, i.e. a flip from here may
    /// leave the chapter.
    pub fn is_boundary_page(&self, index: usize) -> bool {
        index == 0 || index >= self.last_page_index()
    }

    /// Copy of this page data with the adjacent chapters attached as context.
    pub fn with_adjacent(&self, previous: Option<&Arc<PageData>>, next: Option<&Arc<PageData>>) -> Self {
        Self {
            previous: previous.map(|p| Arc::new(p.detached())),
            next: next.map(|n| Arc::new(n.detached())),
            ..self.clone()
        }
    }

    /// Copy of this page data without adjacent context.
    pub fn detached(&self) -> Self {
        Self {
            previous: None,
            next: None,
            ..self.clone()
        }
    }
}
