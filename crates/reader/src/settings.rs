//! Reader settings and container changes.
//!
//! A change that alters the page geometry repaginates in up to three tiers,
//! each a fallback for the one before:
//!
//! 1. re-split the current chapter and its resident neighbours through the
//!    cache and rebuild the virtual pages;
//! 2. split only the current chapter, directly from its text;
//! 3. keep the old pages and only swap in the new settings.
//!
//! The reading position keeps its relative place in the chapter.

use crate::error::{ErrorKind, Result};
use crate::state::ReaderState;
use crate::switch::{Landing, resident_window};
use crate::virtual_pages::VirtualPageBuilder;
use exn::ResultExt;
use pageturn_cache::{ChapterCache, ChapterTarget};
use pageturn_layout::models::{ContainerSize, Layout, PageData, PagePosition, ReaderSettings};
use std::sync::Arc;

/// Whether switching from `old` to `new` settings changes the pages.
///
/// Brightness, text colour and switching between horizontal flip effects
/// never do. Nothing repaginates until the container has been measured.
pub fn needs_repagination(old: &ReaderSettings, new: &ReaderSettings, container_valid: bool) -> bool {
    container_valid
        && (old.font_size != new.font_size
            || old.background_color != new.background_color
            || old.flip_effect.is_vertical() != new.flip_effect.is_vertical())
}

/// Page of a `new_total` page chapter at the same relative place as `page`
/// of an `old_total` page one.
pub fn restore_page(page: usize, old_total: usize, new_total: usize) -> usize {
    let last = new_total.saturating_sub(1);
    if old_total == 0 {
        return page.min(last);
    }
    let ratio = page as f64 / old_total as f64;
    ((ratio * new_total as f64).round() as usize).min(last)
}

/// How a settings change was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepaginationTier {
    NotNeeded,
    Full,
    CurrentChapter,
    KeepPages,
}

#[derive(Debug, Clone)]
pub struct SettingsUpdate {
    pub state: ReaderState,
    pub tier: RepaginationTier,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SettingsUpdateCoordinator {
    builder: VirtualPageBuilder,
}

impl SettingsUpdateCoordinator {
    pub fn new(builder: VirtualPageBuilder) -> Self {
        Self { builder }
    }

    /// Apply new reader settings. Never fails; see the module docs for the
    /// fallbacks.
    pub async fn apply(&self, cache: &ChapterCache, state: &ReaderState, settings: ReaderSettings) -> SettingsUpdate {
        let repaginate = needs_repagination(&state.settings, &settings, state.container.is_valid());
        let font_changed = state.settings.font_size != settings.font_size;
        let updated = ReaderState {
            page_counts: if font_changed { None } else { state.page_counts.clone() },
            settings,
            ..state.clone()
        };
        if !repaginate {
            return SettingsUpdate {
                state: updated,
                tier: RepaginationTier::NotNeeded,
            };
        }
        self.repaginate(cache, state, updated).await
    }

    /// Apply a new container size, e.g. after rotation or a window resize.
    pub async fn resize(&self, cache: &ChapterCache, state: &ReaderState, container: ContainerSize) -> SettingsUpdate {
        if container == state.container {
            return SettingsUpdate {
                state: state.clone(),
                tier: RepaginationTier::NotNeeded,
            };
        }
        let updated = ReaderState {
            container,
            page_counts: None,
            ..state.clone()
        };
        if !container.is_valid() {
            tracing::debug!(container = %container, "Container not measured, keeping pages");
            return self.keep_pages(updated);
        }
        self.repaginate(cache, state, updated).await
    }

    async fn repaginate(&self, cache: &ChapterCache, old: &ReaderState, updated: ReaderState) -> SettingsUpdate {
        let Some(target) = updated.target(updated.current_chapter_index) else {
            return self.keep_pages(updated);
        };
        let layout = updated.layout();
        match self.full(cache, old, &updated, &target, &layout).await {
            Ok(state) => {
                tracing::info!(chapter = %target.chapter.id, "Repaginated current and adjacent chapters");
                return SettingsUpdate {
                    state,
                    tier: RepaginationTier::Full,
                };
            },
            Err(err) => tracing::warn!(chapter = %target.chapter.id, error = ?err, "Full repagination failed"),
        }
        match self.current_only(cache, old, &updated, &target, &layout).await {
            Ok(state) => {
                tracing::info!(chapter = %target.chapter.id, "Repaginated current chapter only");
                return SettingsUpdate {
                    state,
                    tier: RepaginationTier::CurrentChapter,
                };
            },
            Err(err) => tracing::warn!(chapter = %target.chapter.id, error = ?err, "Current chapter repagination failed"),
        }
        self.keep_pages(updated)
    }

    async fn full(
        &self,
        cache: &ChapterCache,
        old: &ReaderState,
        updated: &ReaderState,
        target: &ChapterTarget,
        layout: &Layout,
    ) -> Result<ReaderState> {
        let index = target.index();
        let id = &target.chapter.id;
        let data = cache.resplit(target, layout).await.or_raise(|| ErrorKind::ChapterLoad(id.clone()))?;

        let mut neighbours = [None, None];
        for (slot, neighbour) in neighbours.iter_mut().zip([index.checked_sub(1), index.checked_add(1)]) {
            let Some(neighbour) = neighbour.and_then(|i| updated.target(i)) else {
                continue;
            };
            // Only resident text; anything else is left to the next preload pass.
            if cache.content(&neighbour.chapter.id).is_none() {
                continue;
            }
            match cache.resplit(&neighbour, layout).await {
                Ok(data) => *slot = Some(data),
                Err(err) => tracing::debug!(chapter = %neighbour.chapter.id, error = ?err, "Failed to re-split neighbour"),
            }
        }
        let [previous, next] = neighbours;
        let data = if previous.is_some() || next.is_some() {
            let attached = Arc::new(data.with_adjacent(previous.as_ref(), next.as_ref()));
            cache.set_page_data(id, attached.clone());
            attached
        } else {
            data
        };

        let mut loaded = resident_window(cache, updated, index, self.builder.radius(), &layout.key());
        loaded.insert(id.clone(), data.clone());
        let state = ReaderState {
            current_page: restored_position(old, &data),
            current_content: Some(data),
            loaded_chapters: Arc::new(loaded),
            ..updated.clone()
        };
        self.builder.apply(&state, false)
    }

    async fn current_only(
        &self,
        cache: &ChapterCache,
        old: &ReaderState,
        updated: &ReaderState,
        target: &ChapterTarget,
        layout: &Layout,
    ) -> Result<ReaderState> {
        let id = &target.chapter.id;
        let content = match cache.content(id) {
            Some(content) => content,
            None => {
                let fetched = cache.source().chapter_content(id).await.or_raise(|| ErrorKind::ChapterLoad(id.clone()))?;
                fetched.content
            },
        };
        let owned = layout.clone();
        let pages = tokio::task::spawn_blocking(move || pageturn_layout::split(&content, &owned))
            .await
            .or_raise(|| ErrorKind::ChapterLoad(id.clone()))?
            .or_raise(|| ErrorKind::LayoutNotReady)?;
        let data = Arc::new(PageData::new(id.clone(), pages, target.position, target.book_info.clone(), layout.key()));
        cache.set_page_data(id, data.clone());

        let mut loaded = (*updated.loaded_chapters).clone();
        loaded.insert(id.clone(), data.clone());
        let state = ReaderState {
            current_page: restored_position(old, &data),
            current_content: Some(data),
            loaded_chapters: Arc::new(loaded),
            ..updated.clone()
        };
        self.builder.apply(&state, false)
    }

    /// Tier 3: old pages, new settings. Chapters paginated for the old layout
    /// drop out of the virtual pages; the current one stays.
    fn keep_pages(&self, updated: ReaderState) -> SettingsUpdate {
        let state = match self.builder.apply(&updated, true) {
            Ok(state) => state,
            Err(_) => updated,
        };
        SettingsUpdate {
            state,
            tier: RepaginationTier::KeepPages,
        }
    }
}

fn restored_position(old: &ReaderState, data: &PageData) -> PagePosition {
    let position = match old.current_page {
        PagePosition::BookDetail => PagePosition::BookDetail,
        PagePosition::Page(page) => {
            let old_total = old.current_content.as_ref().map_or(0, |data| data.page_count());
            PagePosition::Page(restore_page(page, old_total, data.page_count()))
        },
    };
    Landing::At(position).resolve(data)
}
