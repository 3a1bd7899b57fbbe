//! Forward and backward navigation.

use crate::error::{ErrorKind, Result};
use crate::state::{ReaderState, VirtualPage};
use crate::switch::{Landing, switch_chapter};
use crate::virtual_pages::VirtualPageBuilder;
use exn::OptionExt;
use pageturn_cache::ChapterCache;
use pageturn_layout::models::PagePosition;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDirection {
    Next,
    Previous,
}

/// Result of a flip. Every variant except `NoOp` carries the snapshot to
/// commit.
#[derive(Debug, Clone)]
pub enum FlipOutcome {
    /// Debounced, nothing to show, or at the start/end of the book.
    NoOp,
    /// Moved within the virtual page list. `needs_preload_check` is set when
    /// the new page sits on a chapter boundary or in another chapter.
    PageChanged { state: ReaderState, needs_preload_check: bool },
    /// Moved, but a resolved neighbour of the new chapter is missing from the
    /// virtual page list; rebuild before committing.
    NeedsVirtualPageRebuild { state: ReaderState },
    /// Left the virtual page list: the adjacent chapter was loaded and the
    /// virtual pages rebuilt around it. A preload pass centred on the new
    /// chapter should follow.
    ChapterSwitched { state: ReaderState },
}
impl FlipOutcome {
    pub fn state(&self) -> Option<&ReaderState> {
        match self {
            Self::NoOp => None,
            Self::PageChanged { state, .. } | Self::NeedsVirtualPageRebuild { state } | Self::ChapterSwitched { state } => {
                Some(state)
            },
        }
    }
}

/// Flip state machine. The only state it keeps is the debounce clock; the
/// reading position lives in the [`ReaderState`] passed to each flip.
#[derive(Debug, Clone)]
pub struct FlipEngine {
    cooldown: Duration,
    last_accepted: Option<Instant>,
    builder: VirtualPageBuilder,
}
impl FlipEngine {
    pub fn new(cooldown: Duration, builder: VirtualPageBuilder) -> Self {
        Self {
            cooldown,
            last_accepted: None,
            builder,
        }
    }

    /// Flip one page in `direction`.
    ///
    /// Fails only when crossing into a chapter that cannot be loaded; the
    /// debounce clock is left untouched in that case.
    pub async fn flip(
        &mut self,
        cache: &ChapterCache,
        state: &ReaderState,
        direction: FlipDirection,
        now: Instant,
    ) -> Result<FlipOutcome> {
        if let Some(last) = self.last_accepted
            && now.saturating_duration_since(last) < self.cooldown
        {
            tracing::trace!("Flip debounced");
            return Ok(FlipOutcome::NoOp);
        }
        if state.virtual_pages.is_empty() {
            return Ok(FlipOutcome::NoOp);
        }
        let next_index = match direction {
            FlipDirection::Next => state.virtual_page_index.checked_add(1),
            FlipDirection::Previous => state.virtual_page_index.checked_sub(1),
        };
        let outcome = match next_index.filter(|index| *index < state.virtual_pages.len()) {
            Some(index) => self.move_within(state, index, direction)?,
            None => self.cross_chapter(cache, state, direction).await?,
        };
        if !matches!(outcome, FlipOutcome::NoOp) {
            self.last_accepted = Some(now);
        }
        Ok(outcome)
    }

    fn move_within(&self, state: &ReaderState, index: usize, direction: FlipDirection) -> Result<FlipOutcome> {
        let (chapter_index, page, needs_preload_check) = match &state.virtual_pages[index] {
            VirtualPage::BookDetail => (0, PagePosition::BookDetail, false),
            VirtualPage::Content { chapter_id, page_index } => {
                let chapter_index =
                    state.chapter_index_of(chapter_id).ok_or_raise(|| ErrorKind::UnknownChapter(chapter_id.clone()))?;
                let data = state.resolved(chapter_id).ok_or_raise(|| ErrorKind::MissingPageData(chapter_id.clone()))?;
                let crossed = chapter_index != state.current_chapter_index;
                (chapter_index, PagePosition::Page(*page_index), crossed || data.is_boundary_page(*page_index))
            },
            // Never produced by the builder; step over it.
            VirtualPage::ChapterSection => {
                let skipped = match direction {
                    FlipDirection::Next => index.checked_add(1),
                    FlipDirection::Previous => index.checked_sub(1),
                };
                return match skipped.filter(|i| *i < state.virtual_pages.len()) {
                    Some(skipped) => self.move_within(state, skipped, direction),
                    None => Ok(FlipOutcome::NoOp),
                };
            },
        };
        let chapter = &state.chapters[chapter_index];
        let data = state.resolved(&chapter.id).ok_or_raise(|| ErrorKind::MissingPageData(chapter.id.clone()))?;
        let moved = ReaderState {
            current_chapter_index: chapter_index,
            current_page: page,
            current_content: Some(data.clone()),
            virtual_page_index: index,
            ..state.clone()
        };
        if self.has_unlisted_neighbour(&moved, chapter_index) {
            return Ok(FlipOutcome::NeedsVirtualPageRebuild { state: moved });
        }
        Ok(FlipOutcome::PageChanged {
            state: moved,
            needs_preload_check,
        })
    }

    /// Whether a chapter next to `chapter_index` has resolved page data but no
    /// pages in the virtual list.
    fn has_unlisted_neighbour(&self, state: &ReaderState, chapter_index: usize) -> bool {
        let neighbours = [chapter_index.checked_sub(1), chapter_index.checked_add(1)];
        neighbours.into_iter().flatten().filter_map(|i| state.chapters.get(i)).any(|chapter| {
            state.resolved(&chapter.id).is_some() && !state.virtual_pages.iter().any(|p| p.chapter_id() == Some(&chapter.id))
        })
    }

    async fn cross_chapter(
        &self,
        cache: &ChapterCache,
        state: &ReaderState,
        direction: FlipDirection,
    ) -> Result<FlipOutcome> {
        let (target, landing) = match direction {
            FlipDirection::Next => (state.current_chapter_index.checked_add(1), Landing::First),
            FlipDirection::Previous => (state.current_chapter_index.checked_sub(1), Landing::Last),
        };
        let Some(target) = target.filter(|index| *index < state.chapters.len()) else {
            tracing::debug!(?direction, "Flip at book boundary");
            return Ok(FlipOutcome::NoOp);
        };
        let state = switch_chapter(cache, &self.builder, state, target, landing).await?;
        Ok(FlipOutcome::ChapterSwitched { state })
    }
}
impl Default for FlipEngine {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN, VirtualPageBuilder::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use pageturn_layout::models::ChapterId;

    fn later(now: Instant, steps: u32) -> Instant {
        now + DEFAULT_COOLDOWN * steps
    }

    #[tokio::test]
    async fn next_at_end_of_single_chapter_book_is_noop() {
        let fixture = Fixture::open(&[3], 0, PagePosition::Page(2)).await;
        let mut engine = FlipEngine::default();
        let outcome = engine.flip(&fixture.cache, &fixture.state, FlipDirection::Next, Instant::now()).await.unwrap();
        assert!(matches!(outcome, FlipOutcome::NoOp));
    }

    #[tokio::test]
    async fn previous_from_first_page_shows_book_detail() {
        let fixture = Fixture::open(&[3], 0, PagePosition::Page(0)).await;
        let mut engine = FlipEngine::default();
        let now = Instant::now();
        let outcome = engine.flip(&fixture.cache, &fixture.state, FlipDirection::Previous, now).await.unwrap();
        let FlipOutcome::PageChanged { state, .. } = outcome else {
            panic!("expected a page change, got {outcome:?}");
        };
        assert_eq!(state.current_page, PagePosition::BookDetail);
        assert_eq!(state.current_page.as_raw(), -1);
        assert_eq!(state.virtual_page_index, 0);
        // Nothing before the detail page.
        let outcome = engine.flip(&fixture.cache, &state, FlipDirection::Previous, later(now, 1)).await.unwrap();
        assert!(matches!(outcome, FlipOutcome::NoOp));
    }

    #[tokio::test]
    async fn rapid_flips_are_debounced() {
        let fixture = Fixture::open(&[5], 0, PagePosition::Page(0)).await;
        let mut engine = FlipEngine::default();
        let now = Instant::now();
        let first = engine.flip(&fixture.cache, &fixture.state, FlipDirection::Next, now).await.unwrap();
        let state = first.state().unwrap().clone();
        let second = engine
            .flip(&fixture.cache, &state, FlipDirection::Next, now + Duration::from_millis(100))
            .await
            .unwrap();
        assert!(matches!(second, FlipOutcome::NoOp));
        let third = engine.flip(&fixture.cache, &state, FlipDirection::Next, later(now, 1)).await.unwrap();
        assert_eq!(third.state().unwrap().current_page, PagePosition::Page(2));
    }

    #[tokio::test]
    async fn boundary_pages_request_preload_check() {
        let fixture = Fixture::open(&[4], 0, PagePosition::Page(1)).await;
        let mut engine = FlipEngine::default();
        let now = Instant::now();
        let outcome = engine.flip(&fixture.cache, &fixture.state, FlipDirection::Next, now).await.unwrap();
        assert!(matches!(outcome, FlipOutcome::PageChanged { needs_preload_check: false, .. }));
        let state = outcome.state().unwrap().clone();
        let outcome = engine.flip(&fixture.cache, &state, FlipDirection::Next, later(now, 1)).await.unwrap();
        assert!(matches!(outcome, FlipOutcome::PageChanged { needs_preload_check: true, .. }));
    }

    #[tokio::test]
    async fn empty_virtual_pages_is_noop() {
        let mut fixture = Fixture::open(&[2], 0, PagePosition::Page(0)).await;
        fixture.state.virtual_pages = std::sync::Arc::from([]);
        let mut engine = FlipEngine::default();
        let outcome = engine.flip(&fixture.cache, &fixture.state, FlipDirection::Next, Instant::now()).await.unwrap();
        assert!(matches!(outcome, FlipOutcome::NoOp));
    }

    /// Five chapters of five pages, reading chapter 2 from page 2.
    async fn scenario(preloaded: bool) -> (Fixture, FlipOutcome) {
        let mut fixture = Fixture::open(&[5, 5, 5, 5, 5], 2, PagePosition::Page(2)).await;
        if preloaded {
            fixture.preload(&[0, 1, 3, 4]).await;
        }
        let mut engine = FlipEngine::default();
        let mut state = fixture.state.clone();
        let mut now = Instant::now();
        for _ in 0..2 {
            let outcome = engine.flip(&fixture.cache, &state, FlipDirection::Next, now).await.unwrap();
            state = outcome.state().unwrap().clone();
            now = later(now, 1);
        }
        assert_eq!(state.current_chapter_index, 2);
        assert_eq!(state.current_page, PagePosition::Page(4));
        let outcome = engine.flip(&fixture.cache, &state, FlipDirection::Next, now).await.unwrap();
        (fixture, outcome)
    }

    #[tokio::test]
    async fn scenario_into_preloaded_chapter() {
        let (fixture, outcome) = scenario(true).await;
        let FlipOutcome::PageChanged {
            state,
            needs_preload_check,
        } = outcome
        else {
            panic!("expected an in-window page change, got {outcome:?}");
        };
        assert!(needs_preload_check);
        assert_eq!(state.current_chapter_index, 3);
        assert_eq!(state.current_page, PagePosition::Page(0));
        assert_eq!(state.current_page_data().unwrap().chapter_id, ChapterId::from("c3"));
        assert_eq!(fixture.source.content_fetches(&ChapterId::from("c3")).await, 1);
    }

    #[tokio::test]
    async fn scenario_on_demand_switch() {
        let (fixture, outcome) = scenario(false).await;
        let FlipOutcome::ChapterSwitched { state } = outcome else {
            panic!("expected a chapter switch, got {outcome:?}");
        };
        assert_eq!(state.current_chapter_index, 3);
        assert_eq!(state.current_page, PagePosition::Page(0));
        assert_eq!(state.current_virtual_page(), Some(&VirtualPage::content("c3", 0)));
        assert_eq!(fixture.source.content_fetches(&ChapterId::from("c3")).await, 1);
    }

    #[tokio::test]
    async fn previous_across_chapter_lands_on_last_page() {
        let fixture = Fixture::open(&[3, 4], 1, PagePosition::Page(0)).await;
        let mut engine = FlipEngine::default();
        let outcome = engine.flip(&fixture.cache, &fixture.state, FlipDirection::Previous, Instant::now()).await.unwrap();
        let FlipOutcome::ChapterSwitched { state } = outcome else {
            panic!("expected a chapter switch, got {outcome:?}");
        };
        assert_eq!(state.current_chapter_index, 0);
        assert_eq!(state.current_page, PagePosition::Page(2));
    }

    #[tokio::test]
    async fn unlisted_resolved_neighbour_requests_rebuild() {
        let mut fixture = Fixture::open(&[2, 2, 2], 0, PagePosition::Page(0)).await;
        fixture.preload(&[1]).await;
        // c2 resolves without a rebuild, as a preload pass without a new
        // adjacent chapter would leave it.
        let layout = fixture.state.layout();
        let c2 = fixture.cache.load(&fixture.state.target(2).unwrap(), &layout).await.unwrap();
        let mut loaded = (*fixture.state.loaded_chapters).clone();
        loaded.insert(ChapterId::from("c2"), c2);
        let state = ReaderState {
            loaded_chapters: std::sync::Arc::new(loaded),
            ..fixture.state.clone()
        };
        let mut engine = FlipEngine::default();
        let now = Instant::now();
        // detail, c0p0, c0p1, c1p0, c1p1: two flips reach c1.
        let outcome = engine.flip(&fixture.cache, &state, FlipDirection::Next, now).await.unwrap();
        let state = outcome.state().unwrap().clone();
        let outcome = engine.flip(&fixture.cache, &state, FlipDirection::Next, later(now, 1)).await.unwrap();
        let FlipOutcome::NeedsVirtualPageRebuild { state } = outcome else {
            panic!("expected a rebuild request, got {outcome:?}");
        };
        assert_eq!(state.current_chapter_index, 1);
        assert_eq!(state.current_page, PagePosition::Page(0));
    }

    #[tokio::test]
    async fn failed_switch_does_not_consume_cooldown() {
        let fixture = Fixture::open(&[2, 2], 0, PagePosition::Page(1)).await;
        fixture.source.fail_next(&ChapterId::from("c1"), 1, pageturn_source::error::ErrorKind::Network("x".into())).await;
        let mut engine = FlipEngine::default();
        let now = Instant::now();
        let err = engine.flip(&fixture.cache, &fixture.state, FlipDirection::Next, now).await.unwrap_err();
        assert_eq!(*err, ErrorKind::ChapterLoad(ChapterId::from("c1")));
        let retried = engine.flip(&fixture.cache, &fixture.state, FlipDirection::Next, now).await.unwrap();
        assert!(matches!(retried, FlipOutcome::ChapterSwitched { .. }));
    }
}
