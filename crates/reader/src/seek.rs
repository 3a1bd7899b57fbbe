//! Jumping to a whole-book progress position.

use crate::error::{ErrorKind, Result};
use crate::state::ReaderState;
use crate::switch::{Landing, switch_chapter};
use crate::virtual_pages::VirtualPageBuilder;
use exn::OptionExt;
use pageturn_cache::ChapterCache;
use pageturn_layout::models::{ChapterId, PageCountCacheData, PagePosition};

#[derive(Debug, Clone)]
pub enum SeekOutcome {
    /// No valid page-count index for the current layout, or an empty book.
    NoOp,
    Moved { state: ReaderState },
}

/// Chapter and relative page for `progress` through the book.
///
/// `progress` is clamped to `0.0..=1.0` (NaN counts as the start); the
/// absolute target page is `floor(progress × total)`, capped at the last page.
pub fn resolve(index: &PageCountCacheData, progress: f32) -> Option<(ChapterId, usize)> {
    if index.total_pages == 0 {
        return None;
    }
    let progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
    let target = ((progress as f64 * index.total_pages as f64).floor() as usize).min(index.total_pages - 1);
    index.find_chapter_by_absolute_page(target)
}

/// Seek transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeekProgress {
    builder: VirtualPageBuilder,
}
impl SeekProgress {
    pub fn new(builder: VirtualPageBuilder) -> Self {
        Self { builder }
    }

    /// Move to `progress` through the book.
    ///
    /// The target chapter is always loaded like a chapter switch, even when
    /// it is the current chapter, so the virtual pages are rebuilt around it.
    pub async fn execute(&self, cache: &ChapterCache, state: &ReaderState, progress: f32) -> Result<SeekOutcome> {
        let Some(index) = state.valid_page_counts() else {
            tracing::debug!(book = %state.book_id, "Seek without a page-count index");
            return Ok(SeekOutcome::NoOp);
        };
        let Some((chapter_id, page)) = resolve(index, progress) else {
            return Ok(SeekOutcome::NoOp);
        };
        let chapter = state.chapter_index_of(&chapter_id).ok_or_raise(|| ErrorKind::UnknownChapter(chapter_id.clone()))?;
        tracing::debug!(progress, chapter = %chapter_id, page, "Seeking");
        let state = switch_chapter(cache, &self.builder, state, chapter, Landing::At(PagePosition::Page(page))).await?;
        Ok(SeekOutcome::Moved { state })
    }
}
