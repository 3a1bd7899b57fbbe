//! Flattening a window of chapters into one addressable page list.

use crate::error::{ErrorKind, Result};
use crate::state::{ReaderState, VirtualPage};
use exn::OptionExt;
use pageturn_layout::models::{ChapterId, PageData, PagePosition};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_RADIUS: usize = 3;

/// Result of a virtual page build.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualPageSet {
    pub pages: Vec<VirtualPage>,
    /// Where the cursor lands in `pages`.
    pub index: usize,
    /// Page data of every chapter that contributed pages.
    pub loaded: HashMap<ChapterId, Arc<PageData>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualPageBuilder {
    radius: usize,
}
impl Default for VirtualPageBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_RADIUS)
    }
}
impl VirtualPageBuilder {
    pub fn new(radius: usize) -> Self {
        Self { radius }
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Builds the virtual page list around the current chapter.
    ///
    /// Only chapters whose page data is already resolved take part; the
    /// window grows outwards from the current chapter and stops at the first
    /// unresolved chapter on each side, so the list is always contiguous in
    /// reading order. A [`BookDetail`](VirtualPage::BookDetail) entry precedes
    /// the pages of a chapter that has a detail page.
    ///
    /// The cursor is placed by the first rule that applies:
    /// 1. with `preserve_current_index`, the old index if it still points at
    ///    the current position;
    /// 2. the detail page, when the current position is the detail page;
    /// 3. the exact current page;
    /// 4. the first page of the current chapter;
    /// 5. index 0.
    pub fn build(&self, state: &ReaderState, preserve_current_index: bool) -> Result<VirtualPageSet> {
        let current = state.current_chapter().ok_or_raise(|| ErrorKind::MissingCurrentChapter)?;
        let current_data = state
            .current_content
            .as_ref()
            .filter(|data| data.chapter_id == current.id)
            .ok_or_raise(|| ErrorKind::MissingPageData(current.id.clone()))?;

        let index = state.current_chapter_index;
        let mut first = index;
        while first > 0 && index - first < self.radius && state.resolved(&state.chapters[first - 1].id).is_some() {
            first -= 1;
        }
        let mut last = index;
        while last + 1 < state.chapters.len()
            && last - index < self.radius
            && state.resolved(&state.chapters[last + 1].id).is_some()
        {
            last += 1;
        }

        let mut pages = Vec::new();
        let mut loaded = HashMap::new();
        for chapter in &state.chapters[first..=last] {
            let data = match state.resolved(&chapter.id) {
                Some(data) => data.clone(),
                None => current_data.clone(),
            };
            if data.has_book_detail_page {
                pages.push(VirtualPage::BookDetail);
            }
            pages.extend((0..data.page_count()).map(|page| VirtualPage::content(chapter.id.clone(), page)));
            loaded.insert(chapter.id.clone(), data);
        }

        let index = self.locate(state, &current.id, &pages, preserve_current_index);
        Ok(VirtualPageSet { pages, index, loaded })
    }

    /// Builds and returns a new snapshot carrying the rebuilt list.
    ///
    /// Page data of chapters further than the radius from the current one is
    /// dropped from the snapshot; the cache still holds what it keeps.
    pub fn apply(&self, state: &ReaderState, preserve_current_index: bool) -> Result<ReaderState> {
        let set = self.build(state, preserve_current_index)?;
        let index = state.current_chapter_index;
        let last = (index + self.radius).min(state.chapters.len() - 1);
        let mut loaded: HashMap<_, _> = state.chapters[index.saturating_sub(self.radius)..=last]
            .iter()
            .filter_map(|chapter| Some((chapter.id.clone(), state.loaded_chapters.get(&chapter.id)?.clone())))
            .collect();
        loaded.extend(set.loaded);
        Ok(ReaderState {
            virtual_pages: set.pages.into(),
            virtual_page_index: set.index,
            loaded_chapters: Arc::new(loaded),
            ..state.clone()
        })
    }

    fn locate(&self, state: &ReaderState, current: &ChapterId, pages: &[VirtualPage], preserve: bool) -> usize {
        let wanted = match state.current_page {
            PagePosition::BookDetail => VirtualPage::BookDetail,
            PagePosition::Page(page_index) => VirtualPage::content(current.clone(), page_index),
        };
        if preserve && pages.get(state.virtual_page_index) == Some(&wanted) {
            return state.virtual_page_index;
        }
        if let Some(found) = pages.iter().position(|page| *page == wanted) {
            return found;
        }
        if state.current_page == PagePosition::BookDetail {
            return 0;
        }
        pages.iter().position(|page| page.chapter_id() == Some(current)).unwrap_or(0)
    }
}
