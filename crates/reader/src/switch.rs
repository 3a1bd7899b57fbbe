//! Moving the reading position to another chapter.
//!
//! Shared by flips across a chapter boundary, seeks and session start: the
//! chapter is loaded through the cache (waiting on an in-flight preload if
//! there is one), neighbours already in the cache are attached as context,
//! and the virtual page list is rebuilt around it.

use crate::error::{ErrorKind, Result};
use crate::state::ReaderState;
use crate::virtual_pages::VirtualPageBuilder;
use exn::{OptionExt, ResultExt};
use pageturn_cache::ChapterCache;
use pageturn_layout::models::{ChapterId, LayoutKey, PageData, PagePosition};
use std::collections::HashMap;
use std::sync::Arc;

/// Where to land in the newly loaded chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Landing {
    First,
    Last,
    /// A specific position, clamped to the chapter. The detail page falls
    /// back to the first page when the chapter has none.
    At(PagePosition),
}
impl Landing {
    pub(crate) fn resolve(self, data: &PageData) -> PagePosition {
        match self {
            Self::First => PagePosition::Page(0),
            Self::Last => PagePosition::Page(data.last_page_index()),
            Self::At(PagePosition::BookDetail) if data.has_book_detail_page => PagePosition::BookDetail,
            Self::At(PagePosition::BookDetail) => PagePosition::Page(0),
            Self::At(PagePosition::Page(page)) => PagePosition::Page(page.min(data.last_page_index())),
        }
    }
}

/// Resident page data for the chapters within `radius` of `index`.
pub(crate) fn resident_window(
    cache: &ChapterCache,
    state: &ReaderState,
    index: usize,
    radius: usize,
    key: &LayoutKey,
) -> HashMap<ChapterId, Arc<PageData>> {
    if state.chapters.is_empty() {
        return HashMap::new();
    }
    let last = (index + radius).min(state.chapters.len() - 1);
    let first = index.saturating_sub(radius).min(last);
    state.chapters[first..=last]
        .iter()
        .filter_map(|chapter| Some((chapter.id.clone(), cache.page_data(&chapter.id, key)?)))
        .collect()
}

pub(crate) async fn switch_chapter(
    cache: &ChapterCache,
    builder: &VirtualPageBuilder,
    state: &ReaderState,
    index: usize,
    landing: Landing,
) -> Result<ReaderState> {
    let target = state.target(index).ok_or_raise(|| ErrorKind::MissingCurrentChapter)?;
    let id = target.chapter.id.clone();
    let layout = state.layout();
    if !layout.is_ready() {
        exn::bail!(ErrorKind::LayoutNotReady);
    }
    let key = layout.key();
    let data = cache.load(&target, &layout).await.or_raise(|| ErrorKind::ChapterLoad(id.clone()))?;

    let previous = index.checked_sub(1).and_then(|i| state.chapters.get(i)).and_then(|c| cache.page_data(&c.id, &key));
    let next = state.chapters.get(index + 1).and_then(|c| cache.page_data(&c.id, &key));
    let data = if previous.is_some() || next.is_some() {
        let attached = Arc::new(data.with_adjacent(previous.as_ref(), next.as_ref()));
        cache.set_page_data(&id, attached.clone());
        attached
    } else {
        data
    };

    let mut loaded = resident_window(cache, state, index, builder.radius(), &key);
    loaded.insert(id, data.clone());
    let moved = ReaderState {
        current_chapter_index: index,
        current_page: landing.resolve(&data),
        current_content: Some(data),
        loaded_chapters: Arc::new(loaded),
        ..state.clone()
    };
    tracing::debug!(chapter = index, page = moved.current_page.as_raw(), "Switched chapter");
    builder.apply(&moved, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::VirtualPage;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn landing_positions() {
        let fixture = Fixture::open(&[3, 4, 2], 1, PagePosition::Page(0)).await;
        let builder = VirtualPageBuilder::default();
        let last = switch_chapter(&fixture.cache, &builder, &fixture.state, 1, Landing::Last).await.unwrap();
        assert_eq!(last.current_page, PagePosition::Page(3));
        let clamped =
            switch_chapter(&fixture.cache, &builder, &fixture.state, 2, Landing::At(PagePosition::Page(9))).await.unwrap();
        assert_eq!(clamped.current_page, PagePosition::Page(1));
        let detail =
            switch_chapter(&fixture.cache, &builder, &fixture.state, 0, Landing::At(PagePosition::BookDetail)).await.unwrap();
        assert_eq!(detail.current_page, PagePosition::BookDetail);
        assert_eq!(detail.current_virtual_page(), Some(&VirtualPage::BookDetail));
    }

    #[tokio::test]
    async fn detail_landing_without_detail_page() {
        let fixture = Fixture::open(&[3, 4], 1, PagePosition::BookDetail).await;
        assert_eq!(fixture.state.current_page, PagePosition::Page(0));
        assert_eq!(fixture.state.current_virtual_page(), Some(&VirtualPage::content("c1", 0)));
    }

    #[tokio::test]
    async fn resident_neighbours_are_attached() {
        let fixture = Fixture::open(&[3, 4, 2], 0, PagePosition::Page(0)).await;
        let builder = VirtualPageBuilder::default();
        let moved = switch_chapter(&fixture.cache, &builder, &fixture.state, 1, Landing::First).await.unwrap();
        let current = moved.current_page_data().unwrap();
        assert_eq!(current.previous.as_ref().map(|p| p.chapter_id.clone()), Some(ChapterId::from("c0")));
        assert!(current.next.is_none());
        // c0 is resident and resolved, so its pages (and the detail page) lead the list.
        assert_eq!(moved.virtual_pages[0], VirtualPage::BookDetail);
        assert_eq!(moved.current_virtual_page(), Some(&VirtualPage::content("c1", 0)));
    }

    #[tokio::test]
    async fn load_failure_leaves_no_partial_state() {
        let fixture = Fixture::open(&[3, 4], 0, PagePosition::Page(0)).await;
        let builder = VirtualPageBuilder::default();
        fixture.source.fail_next(&"c1".into(), 1, pageturn_source::error::ErrorKind::NotFound("c1".into())).await;
        let err = switch_chapter(&fixture.cache, &builder, &fixture.state, 1, Landing::First).await.unwrap_err();
        assert_eq!(*err, ErrorKind::ChapterLoad("c1".into()));
    }
}
