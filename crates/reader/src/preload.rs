//! Background chapter prefetch around the reading position.

use crate::state::{ReaderState, VirtualPage};
use crate::virtual_pages::VirtualPageBuilder;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use pageturn_cache::{ChapterCache, Preloaded};
use pageturn_config::PreloadConfig;
use pageturn_layout::models::{ChapterId, LayoutKey, PageData};
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::instrument;

pub const DEFAULT_RADIUS: usize = 2;
pub const DEFAULT_EXPANDED_RADIUS: usize = 4;
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Chapter indexes the current pass keeps loaded, plus the ones it is
/// fetching right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadWindow {
    pub start: usize,
    pub end: usize,
    in_flight: HashSet<usize>,
}
impl PreloadWindow {
    /// Window of `radius` chapters on each side of `current`, clamped to a
    /// book of `total` chapters. `total` must not be zero.
    pub fn around(current: usize, radius: usize, total: usize) -> Self {
        let end = current.saturating_add(radius).min(total.saturating_sub(1));
        Self {
            start: current.saturating_sub(radius).min(end),
            end,
            in_flight: HashSet::new(),
        }
    }

    pub fn range(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }

    pub fn contains(&self, index: usize) -> bool {
        self.range().contains(&index)
    }

    pub fn is_in_flight(&self, index: usize) -> bool {
        self.in_flight.contains(&index)
    }
}

/// What one preload pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadReport {
    pub window: RangeInclusive<usize>,
    /// Layout the pass split for.
    pub layout: LayoutKey,
    /// Indexes fetched by this pass; split too when the layout was ready.
    pub loaded: Vec<usize>,
    /// Indexes whose load failed; the next pass tries again.
    pub failed: Vec<usize>,
    /// Chapters dropped from the cache for being outside the window.
    pub evicted: Vec<ChapterId>,
    /// A chapter directly next to the current one gained page data.
    pub new_adjacent: bool,
    /// Valid page data of every chapter in the window after the pass.
    pub page_data: HashMap<ChapterId, Arc<PageData>>,
}
impl PreloadReport {
    /// Replace the loaded chapters of `state` with the window of this pass.
    ///
    /// Only the window's chapters and the current one stay loaded. The
    /// virtual pages are rebuilt (preserving the cursor) when a direct
    /// neighbour arrived or a listed chapter left the window; anything
    /// further out waits until the reader gets closer. A report for another
    /// layout leaves `state` as it is.
    pub fn apply(&self, state: &ReaderState, builder: &VirtualPageBuilder) -> ReaderState {
        if self.layout != state.layout_key() {
            tracing::debug!("Ignoring preload pass for a previous layout");
            return state.clone();
        }
        let mut loaded = self.page_data.clone();
        if let Some(current) = state.current_chapter()
            && let Some(data) = state.current_content.as_ref().filter(|data| data.chapter_id == current.id)
        {
            loaded.insert(current.id.clone(), data.clone());
        }
        let dropped_listed =
            state.virtual_pages.iter().filter_map(VirtualPage::chapter_id).any(|id| !loaded.contains_key(id));
        let merged = ReaderState {
            loaded_chapters: Arc::new(loaded),
            ..state.clone()
        };
        if !self.new_adjacent && !dropped_listed {
            return merged;
        }
        match builder.apply(&merged, true) {
            Ok(rebuilt) => rebuilt,
            Err(err) => {
                tracing::warn!(error = ?err, "Failed to rebuild virtual pages after preload");
                merged
            },
        }
    }
}

/// Keeps the chapters around the reading position fetched and split.
#[derive(Debug, Clone)]
pub struct PreloadManager {
    radius: usize,
    expanded_radius: usize,
    concurrency: usize,
    window: Option<PreloadWindow>,
}
impl Default for PreloadManager {
    fn default() -> Self {
        Self::new(DEFAULT_RADIUS, DEFAULT_EXPANDED_RADIUS, DEFAULT_CONCURRENCY)
    }
}
impl PreloadManager {
    pub fn new(radius: usize, expanded_radius: usize, concurrency: usize) -> Self {
        Self {
            radius,
            expanded_radius: expanded_radius.max(radius),
            concurrency: concurrency.max(1),
            window: None,
        }
    }

    pub fn from_config(config: &PreloadConfig) -> Self {
        Self::new(config.radius, config.expanded_radius, config.concurrency)
    }

    /// Window of the last (or running) pass.
    pub fn window(&self) -> Option<&PreloadWindow> {
        self.window.as_ref()
    }

    /// Run one preload pass around the current chapter of `state`.
    ///
    /// Before the container is measured only chapter text is fetched, the
    /// current chapter's included, so the first layout splits without a
    /// round trip. Returns `None` for an empty book. Failures of single
    /// chapters are logged and reported, never returned.
    #[instrument(skip_all, fields(book = %state.book_id, chapter = state.current_chapter_index, expand = expand))]
    pub async fn run(&mut self, cache: &ChapterCache, state: &ReaderState, expand: bool) -> Option<PreloadReport> {
        let total = state.chapters.len();
        if total == 0 {
            return None;
        }
        let layout = state.layout();
        let ready = layout.is_ready();
        let key = layout.key();
        let current = state.current_chapter_index.min(total - 1);
        let radius = if expand { self.expanded_radius } else { self.radius };
        let window = self.window.insert(PreloadWindow::around(current, radius, total));
        cache.set_window(window.range());

        let adjacent: Vec<usize> = [current.checked_sub(1), current.checked_add(1)]
            .into_iter()
            .flatten()
            .filter(|index| *index < total)
            .collect();
        let had_adjacent: Vec<bool> =
            adjacent.iter().map(|index| state.resolved(&state.chapters[*index].id).is_some()).collect();

        let mut targets: Vec<_> = window
            .range()
            .filter(|index| !ready || *index != current)
            .filter(|index| {
                let id = &state.chapters[*index].id;
                let resident =
                    if ready { cache.page_data(id, &key).is_some() } else { cache.content(id).is_some() };
                !resident && !cache.is_in_flight(id)
            })
            .filter_map(|index| state.target(index))
            .collect();
        // Nearest chapters first.
        targets.sort_by_key(|target| target.index().abs_diff(current));
        window.in_flight.extend(targets.iter().map(|target| target.index()));

        let layout = &layout;
        let mut pending: Vec<_> = targets
            .iter()
            .map(|target| async move { (target.index(), cache.preload(target, layout).await) })
            .collect();
        let mut processing = FuturesUnordered::new();
        processing.extend(pending.drain(..self.concurrency.min(pending.len())));
        let mut loaded = Vec::new();
        let mut failed = Vec::new();
        while let Some((index, result)) = processing.next().await {
            window.in_flight.remove(&index);
            match result {
                Ok(Preloaded::Loaded(_) | Preloaded::Fetched) => loaded.push(index),
                Ok(Preloaded::Cached(_) | Preloaded::InFlight) => {},
                Err(err) => {
                    tracing::warn!(chapter = index, error = ?err, "Failed to preload chapter");
                    failed.push(index);
                },
            }
            // Pop-n-push, nearest first.
            if !pending.is_empty() {
                processing.push(pending.remove(0));
            }
        }
        loaded.sort_unstable();
        failed.sort_unstable();

        let evicted = cache.retain_window(window.range());
        let page_data: HashMap<_, _> = window
            .range()
            .filter_map(|index| {
                let id = &state.chapters[index].id;
                Some((id.clone(), cache.page_data(id, &key)?))
            })
            .collect();
        let new_adjacent = adjacent
            .iter()
            .zip(had_adjacent)
            .any(|(index, had)| !had && page_data.contains_key(&state.chapters[*index].id));
        tracing::debug!(
            start = window.start,
            end = window.end,
            loaded = loaded.len(),
            failed = failed.len(),
            evicted = evicted.len(),
            new_adjacent,
            "Preload pass finished"
        );
        Some(PreloadReport {
            window: window.range(),
            layout: key,
            loaded,
            failed,
            evicted,
            new_adjacent,
            page_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::VirtualPage;
    use crate::switch::{Landing, switch_chapter};
    use crate::testing::{Fixture, text};
    use pageturn_layout::models::PagePosition;
    use pageturn_source::content::MockSource;
    use pageturn_source::error::ErrorKind as SourceErrorKind;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[case(0, 2, 5, 0, 2)]
    #[case(4, 2, 5, 2, 4)]
    #[case(1, 4, 3, 0, 2)]
    #[case(1, 0, 3, 1, 1)]
    #[case(0, 2, 1, 0, 0)]
    fn window_is_clamped(
        #[case] current: usize,
        #[case] radius: usize,
        #[case] total: usize,
        #[case] start: usize,
        #[case] end: usize,
    ) {
        let window = PreloadWindow::around(current, radius, total);
        assert_eq!((window.start, window.end), (start, end));
        assert!(window.contains(current));
    }

    #[tokio::test]
    async fn loads_neighbours_once() {
        let fixture = Fixture::open(&[2; 6], 2, PagePosition::Page(0)).await;
        let mut manager = PreloadManager::default();
        let report = manager.run(&fixture.cache, &fixture.state, false).await.unwrap();
        assert_eq!(report.window, 0..=4);
        assert_eq!(report.loaded, vec![0, 1, 3, 4]);
        assert!(report.failed.is_empty());
        assert!(report.new_adjacent);
        assert_eq!(report.page_data.len(), 5);
        assert_eq!(fixture.source.total_content_fetches().await, 5);

        let state = report.apply(&fixture.state, &VirtualPageBuilder::default());
        let again = manager.run(&fixture.cache, &state, false).await.unwrap();
        assert!(again.loaded.is_empty());
        assert!(!again.new_adjacent);
        assert_eq!(fixture.source.total_content_fetches().await, 5);
    }

    #[tokio::test]
    async fn expanded_radius() {
        let fixture = Fixture::open(&[1; 10], 4, PagePosition::Page(0)).await;
        let mut manager = PreloadManager::default();
        let report = manager.run(&fixture.cache, &fixture.state, true).await.unwrap();
        assert_eq!(report.window, 0..=8);
        assert_eq!(report.loaded, vec![0, 1, 2, 3, 5, 6, 7, 8]);
        assert_eq!(manager.window().map(PreloadWindow::range), Some(0..=8));
    }

    #[tokio::test]
    async fn failures_are_reported_and_retried() {
        let fixture = Fixture::open(&[2; 6], 2, PagePosition::Page(0)).await;
        fixture.source.fail_next(&"c3".into(), 1, SourceErrorKind::Network("reset".into())).await;
        let mut manager = PreloadManager::default();
        let report = manager.run(&fixture.cache, &fixture.state, false).await.unwrap();
        assert_eq!(report.failed, vec![3]);
        assert_eq!(report.loaded, vec![0, 1, 4]);
        assert!(report.new_adjacent);
        assert!(!manager.window().unwrap().is_in_flight(3));

        let retry = manager.run(&fixture.cache, &fixture.state, false).await.unwrap();
        assert_eq!(retry.loaded, vec![3]);
    }

    #[tokio::test]
    async fn chapters_outside_window_are_evicted() {
        let fixture = Fixture::open(&[1; 8], 0, PagePosition::Page(0)).await;
        let mut manager = PreloadManager::default();
        let report = manager.run(&fixture.cache, &fixture.state, false).await.unwrap();
        assert_eq!(report.loaded, vec![1, 2]);

        let builder = VirtualPageBuilder::default();
        let moved = switch_chapter(&fixture.cache, &builder, &fixture.state, 6, Landing::First).await.unwrap();
        let report = manager.run(&fixture.cache, &moved, false).await.unwrap();
        assert_eq!(report.window, 4..=7);
        let mut evicted = report.evicted.clone();
        evicted.sort();
        assert_eq!(evicted, vec![ChapterId::from("c0"), ChapterId::from("c1"), ChapterId::from("c2")]);
        assert!(fixture.cache.get(&ChapterId::from("c0")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_foreground_load_is_not_duplicated() {
        let source = Arc::new(
            MockSource::with_chapters("book", (0..3).map(|i| (format!("c{i}"), text(2))))
                .with_latency(Duration::from_millis(50)),
        );
        let fixture = Fixture::with_source(source, 0, PagePosition::Page(0)).await;
        let mut manager = PreloadManager::default();
        let target = fixture.state.target(1).unwrap();
        let layout = fixture.state.layout();
        let (foreground, report) =
            tokio::join!(fixture.cache.load(&target, &layout), manager.run(&fixture.cache, &fixture.state, false));
        assert!(foreground.is_ok());
        let report = report.unwrap();
        assert_eq!(report.loaded, vec![2]);
        assert_eq!(fixture.source.content_fetches(&ChapterId::from("c1")).await, 1);
    }

    #[tokio::test]
    async fn applying_a_report_extends_virtual_pages() {
        let fixture = Fixture::open(&[2, 2, 2], 1, PagePosition::Page(1)).await;
        assert_eq!(fixture.state.virtual_pages.len(), 2);
        let mut manager = PreloadManager::default();
        let report = manager.run(&fixture.cache, &fixture.state, false).await.unwrap();
        let state = report.apply(&fixture.state, &VirtualPageBuilder::default());
        // Detail page, then two pages per chapter.
        assert_eq!(state.virtual_pages.len(), 7);
        assert_eq!(state.current_virtual_page(), Some(&VirtualPage::content("c1", 1)));
        assert_eq!(state.loaded_chapters.len(), 3);
    }

    #[tokio::test]
    async fn chapters_leaving_the_window_leave_the_state() {
        let mut fixture = Fixture::open(&[1; 6], 1, PagePosition::Page(0)).await;
        fixture.preload(&[0, 2, 3]).await;
        assert_eq!(fixture.state.virtual_pages.len(), 5);

        let mut manager = PreloadManager::new(1, 1, 1);
        let report = manager.run(&fixture.cache, &fixture.state, false).await.unwrap();
        assert_eq!(report.window, 0..=2);
        assert_eq!(report.evicted, vec![ChapterId::from("c3")]);
        assert!(!report.new_adjacent);

        let state = report.apply(&fixture.state, &VirtualPageBuilder::default());
        assert_eq!(state.loaded_chapters.len(), 3);
        assert!(!state.loaded_chapters.contains_key(&ChapterId::from("c3")));
        assert!(!state.virtual_pages.contains(&VirtualPage::content("c3", 0)));
        assert_eq!(state.current_virtual_page(), Some(&VirtualPage::content("c1", 0)));
    }

    #[tokio::test]
    async fn report_for_previous_layout_is_ignored() {
        let fixture = Fixture::open(&[2, 2, 2], 1, PagePosition::Page(0)).await;
        let report = PreloadManager::default().run(&fixture.cache, &fixture.state, false).await.unwrap();
        let resized = ReaderState {
            settings: crate::testing::settings(10),
            ..fixture.state.clone()
        };
        let state = report.apply(&resized, &VirtualPageBuilder::default());
        assert!(Arc::ptr_eq(&state.loaded_chapters, &resized.loaded_chapters));
        assert_eq!(state.virtual_pages, resized.virtual_pages);
    }

    #[tokio::test]
    async fn unmeasured_container_fetches_text_only() {
        let mut fixture = Fixture::open(&[2, 2, 2], 1, PagePosition::Page(0)).await;
        fixture.state.container = pageturn_layout::models::ContainerSize::new(0, 0);
        let mut manager = PreloadManager::default();
        let report = manager.run(&fixture.cache, &fixture.state, false).await.unwrap();
        assert_eq!(report.loaded, vec![0, 2]);
        assert!(report.page_data.is_empty());
        assert!(!report.new_adjacent);
        assert!(fixture.cache.get(&ChapterId::from("c0")).unwrap().page_data.is_none());
        assert_eq!(fixture.source.total_content_fetches().await, 3);
    }
}
