//! Reader state snapshots.

use pageturn_cache::ChapterTarget;
use pageturn_layout::models::{
    BookId, BookInfo, Chapter, ChapterId, ContainerSize, Layout, LayoutKey, PageCountCacheData, PageData,
    PagePosition, ReaderSettings,
};
use std::collections::HashMap;
use std::sync::Arc;

/// One addressable entry in the flat, cross-chapter page list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VirtualPage {
    /// The book detail pseudo-page in front of the first chapter.
    BookDetail,
    Content { chapter_id: ChapterId, page_index: usize },
    /// Reserved for chapter title pages; never produced yet.
    ChapterSection,
}
impl VirtualPage {
    pub fn content(chapter_id: impl Into<ChapterId>, page_index: usize) -> Self {
        Self::Content {
            chapter_id: chapter_id.into(),
            page_index,
        }
    }

    pub fn chapter_id(&self) -> Option<&ChapterId> {
        match self {
            Self::Content { chapter_id, .. } => Some(chapter_id),
            Self::BookDetail | Self::ChapterSection => None,
        }
    }
}

/// Immutable snapshot of everything the renderer and the transitions read.
///
/// Cloning is cheap: collections are behind `Arc`. Transitions never mutate
/// a snapshot; they build a new one with struct-update syntax, so background
/// tasks holding an older snapshot always see a consistent view.
#[derive(Debug, Clone)]
pub struct ReaderState {
    pub book_id: BookId,
    /// Chapter list in reading order; fixed for the session.
    pub chapters: Arc<[Chapter]>,
    pub current_chapter_index: usize,
    pub current_page: PagePosition,
    /// Page data of the current chapter.
    pub current_content: Option<Arc<PageData>>,
    pub book_info: Option<Arc<BookInfo>>,
    pub settings: ReaderSettings,
    pub container: ContainerSize,
    pub density: f32,
    /// Resolved page data of chapters around the current one. May contain
    /// chapters that are not (yet) part of `virtual_pages`.
    pub loaded_chapters: Arc<HashMap<ChapterId, Arc<PageData>>>,
    pub virtual_pages: Arc<[VirtualPage]>,
    pub virtual_page_index: usize,
    pub page_counts: Option<Arc<PageCountCacheData>>,
}

impl ReaderState {
    pub fn new(
        book_id: BookId,
        chapters: Vec<Chapter>,
        book_info: Option<Arc<BookInfo>>,
        layout: &Layout,
    ) -> Self {
        Self {
            book_id,
            chapters: chapters.into(),
            current_chapter_index: 0,
            current_page: PagePosition::default(),
            current_content: None,
            book_info,
            settings: layout.settings.clone(),
            container: layout.container,
            density: layout.density,
            loaded_chapters: Arc::default(),
            virtual_pages: Arc::from([]),
            virtual_page_index: 0,
            page_counts: None,
        }
    }

    pub fn layout(&self) -> Layout {
        Layout::new(self.container, self.settings.clone(), self.density)
    }

    pub fn layout_key(&self) -> LayoutKey {
        LayoutKey {
            font_size: self.settings.font_size,
            container: self.container,
        }
    }

    pub fn current_chapter(&self) -> Option<&Chapter> {
        self.chapters.get(self.current_chapter_index)
    }

    /// What the renderer shows for the current chapter.
    pub fn current_page_data(&self) -> Option<&Arc<PageData>> {
        self.current_content.as_ref()
    }

    pub fn current_virtual_page(&self) -> Option<&VirtualPage> {
        self.virtual_pages.get(self.virtual_page_index)
    }

    pub fn chapter_index_of(&self, id: &ChapterId) -> Option<usize> {
        self.chapters.iter().position(|chapter| chapter.id == *id)
    }

    /// Page data for `id`, if resolved for the current layout.
    pub fn resolved(&self, id: &ChapterId) -> Option<&Arc<PageData>> {
        if let Some(current) = &self.current_content
            && current.chapter_id == *id
        {
            return Some(current);
        }
        let key = self.layout_key();
        self.loaded_chapters.get(id).filter(|data| data.layout == key)
    }

    pub fn target(&self, index: usize) -> Option<ChapterTarget> {
        ChapterTarget::at(&self.chapters, index, self.book_info.clone())
    }

    /// Whether the page-count index can be trusted for the current layout.
    pub fn valid_page_counts(&self) -> Option<&Arc<PageCountCacheData>> {
        let key = self.layout_key();
        self.page_counts.as_ref().filter(|index| index.is_valid_for(&self.book_id, &key))
    }
}
