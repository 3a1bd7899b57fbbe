//! Shared unit test fixtures.
//!
//! Layouts are padding-free with a line spacing of 1, so a 200x100 container
//! at font size 20 is exactly 20 columns by 5 rows: one page per five lines
//! of fixture text.

use crate::state::ReaderState;
use crate::switch::{Landing, switch_chapter};
use crate::virtual_pages::VirtualPageBuilder;
use pageturn_cache::{ChapterCache, DEFAULT_CAPACITY};
use pageturn_layout::models::{BookId, BookInfo, ContainerSize, Layout, PagePosition, ReaderSettings};
use pageturn_source::ContentSource;
use pageturn_source::content::MockSource;
use std::sync::Arc;

pub(crate) const LINES_PER_PAGE: usize = 5;

pub(crate) fn settings(font_size: u16) -> ReaderSettings {
    ReaderSettings {
        font_size,
        line_spacing: 1.0,
        padding_horizontal: 0.0,
        padding_vertical: 0.0,
        ..ReaderSettings::default()
    }
}

pub(crate) fn layout_with(font_size: u16) -> Layout {
    Layout::new(ContainerSize::new(200, 100), settings(font_size), 1.0)
}

pub(crate) fn layout() -> Layout {
    layout_with(20)
}

pub(crate) fn book_info() -> Arc<BookInfo> {
    Arc::new(BookInfo::new("book", "Title").with_author("Author"))
}

/// Text that splits into exactly `pages` pages with [`layout()`].
pub(crate) fn text(pages: usize) -> String {
    (0..pages * LINES_PER_PAGE).map(|line| format!("line {line}")).collect::<Vec<_>>().join("\n")
}

pub(crate) fn source(pages: &[usize]) -> Arc<MockSource> {
    let chapters = pages.iter().enumerate().map(|(i, pages)| (format!("c{i}"), text(*pages)));
    Arc::new(MockSource::with_chapters("book", chapters).with_book_info(BookInfo::new("book", "Title")))
}

pub(crate) struct Fixture {
    pub(crate) source: Arc<MockSource>,
    pub(crate) cache: Arc<ChapterCache>,
    pub(crate) state: ReaderState,
}
impl Fixture {
    /// A book with one chapter per entry of `pages`, opened at `current`.
    pub(crate) async fn open(pages: &[usize], current: usize, page: PagePosition) -> Self {
        Self::with_source(source(pages), current, page).await
    }

    pub(crate) async fn with_source(source: Arc<MockSource>, current: usize, page: PagePosition) -> Self {
        let cache = Arc::new(ChapterCache::new(source.clone(), DEFAULT_CAPACITY));
        let chapters = source.chapter_list(&BookId::from("book")).await.unwrap();
        let state = ReaderState::new(BookId::from("book"), chapters, Some(book_info()), &layout());
        let state = switch_chapter(&cache, &VirtualPageBuilder::default(), &state, current, Landing::At(page))
            .await
            .unwrap();
        Self { source, cache, state }
    }

    /// Loads `indexes` into the cache and rebuilds the virtual pages as if a
    /// preload pass had finished.
    pub(crate) async fn preload(&mut self, indexes: &[usize]) {
        let layout = self.state.layout();
        let mut loaded = (*self.state.loaded_chapters).clone();
        for &index in indexes {
            let target = self.state.target(index).unwrap();
            let data = self.cache.load(&target, &layout).await.unwrap();
            loaded.insert(target.chapter.id, data);
        }
        let state = ReaderState {
            loaded_chapters: Arc::new(loaded),
            ..self.state.clone()
        };
        self.state = VirtualPageBuilder::default().apply(&state, true).unwrap();
    }
}
