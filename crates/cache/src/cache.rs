//! Bounded chapter cache.
//!
//! Chapters are fetched from the content source at most once while they are
//! resident, split on the blocking pool, and evicted least-recently-touched
//! first once the cache is over capacity. Chapters inside the protected
//! window (the reader's preload window) are never evicted for capacity.

use crate::error::{ErrorKind, Result};
use crate::models::{CachedChapter, ChapterTarget, Preloaded};
use exn::ResultExt;
use pageturn_layout::models::{ChapterId, Layout, LayoutKey, PageData};
use pageturn_source::SourceHandle;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::instrument;

pub const DEFAULT_CAPACITY: usize = 12;

struct Entry {
    cached: CachedChapter,
    touched: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<ChapterId, Entry>,
    /// One receiver per chapter being loaded. The loader holds the matching
    /// sender; waiters are woken when it is dropped.
    in_flight: HashMap<ChapterId, watch::Receiver<()>>,
    window: Option<RangeInclusive<usize>>,
    tick: u64,
}
impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn valid_page_data(&mut self, id: &ChapterId, key: &LayoutKey) -> Option<Arc<PageData>> {
        let tick = self.next_tick();
        let entry = self.entries.get_mut(id)?;
        entry.touched = tick;
        entry.cached.page_data.as_ref().filter(|data| data.layout == *key).cloned()
    }

    fn neighbour(&self, index: Option<usize>, key: &LayoutKey) -> Option<Arc<PageData>> {
        let index = index?;
        let entry = self.entries.values().find(|entry| entry.cached.index == index)?;
        entry.cached.page_data.as_ref().filter(|data| data.layout == *key).cloned()
    }

    /// Insert `cached`, then evict over capacity (never `cached` itself).
    fn put(&mut self, cached: CachedChapter, capacity: usize) -> Vec<ChapterId> {
        let id = cached.chapter.id.clone();
        let touched = self.next_tick();
        self.entries.insert(id.clone(), Entry { cached, touched });
        self.enforce_capacity(capacity, &id)
    }

    fn is_protected(&self, index: usize) -> bool {
        self.window.as_ref().is_some_and(|window| window.contains(&index))
    }

    fn enforce_capacity(&mut self, capacity: usize, keep: &ChapterId) -> Vec<ChapterId> {
        let mut evicted = Vec::new();
        while self.entries.len() > capacity {
            let victim = self
                .entries
                .iter()
                .filter(|(id, entry)| *id != keep && !self.is_protected(entry.cached.index))
                .min_by_key(|(_, entry)| entry.touched)
                .map(|(id, _)| id.clone());
            // Everything left is protected: allowed to exceed capacity.
            let Some(victim) = victim else { break };
            self.entries.remove(&victim);
            evicted.push(victim);
        }
        evicted
    }
}

/// Exclusive right to load one chapter. Dropping it clears the in-flight
/// marker and wakes everyone waiting on that chapter.
struct Claim<'a> {
    inner: &'a Mutex<Inner>,
    id: ChapterId,
    _done: watch::Sender<()>,
}
impl Drop for Claim<'_> {
    fn drop(&mut self) {
        lock(self.inner).in_flight.remove(&self.id);
    }
}

enum Slot<'a> {
    Ready(Arc<PageData>),
    Busy(watch::Receiver<()>),
    Claimed(Claim<'a>),
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory cache of chapter text and split pages.
///
/// Shared between the foreground (flips, seeks, settings changes) and the
/// background preload and pagination tasks, so every method takes `&self`.
/// Concurrent requests for the same chapter coalesce: only one of them talks
/// to the source, the others either wait for it ([`load()`](Self::load)) or
/// step aside ([`preload()`](Self::preload)).
pub struct ChapterCache {
    source: SourceHandle,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl ChapterCache {
    pub fn new(source: SourceHandle, capacity: usize) -> Self {
        Self {
            source,
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn source(&self) -> &SourceHandle {
        &self.source
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Resident chapter, marking it as recently used.
    pub fn get(&self, id: &ChapterId) -> Option<CachedChapter> {
        let mut inner = lock(&self.inner);
        let tick = inner.next_tick();
        let entry = inner.entries.get_mut(id)?;
        entry.touched = tick;
        Some(entry.cached.clone())
    }

    /// Page data of a resident chapter, only if it was built for `key`.
    pub fn page_data(&self, id: &ChapterId, key: &LayoutKey) -> Option<Arc<PageData>> {
        lock(&self.inner).valid_page_data(id, key)
    }

    /// Text of a resident chapter, without affecting eviction order.
    pub fn content(&self, id: &ChapterId) -> Option<Arc<str>> {
        lock(&self.inner).entries.get(id).map(|entry| entry.cached.content.clone())
    }

    pub fn is_in_flight(&self, id: &ChapterId) -> bool {
        lock(&self.inner).in_flight.contains_key(id)
    }

    /// Chapter indexes currently resident, ascending.
    pub fn resident_indexes(&self) -> Vec<usize> {
        let mut indexes: Vec<_> = lock(&self.inner).entries.values().map(|entry| entry.cached.index).collect();
        indexes.sort_unstable();
        indexes
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Background load: fetch and split `target` unless valid pages are
    /// already resident or another request is loading it right now.
    ///
    /// Before the container is measured only the text is fetched; it is
    /// split by the first load or re-split for a ready layout.
    #[instrument(skip_all, fields(chapter = %target.chapter.id))]
    pub async fn preload(&self, target: &ChapterTarget, layout: &Layout) -> Result<Preloaded> {
        if !layout.is_ready() {
            return self.prefetch(target).await;
        }
        match self.slot(&target.chapter.id, &layout.key()) {
            Slot::Ready(data) => Ok(Preloaded::Cached(data)),
            Slot::Busy(_) => Ok(Preloaded::InFlight),
            Slot::Claimed(claim) => self.materialize(target, layout, claim).await.map(Preloaded::Loaded),
        }
    }

    /// Foreground load: return valid pages for `target`, waiting for an
    /// in-flight request of the same chapter instead of duplicating it.
    #[instrument(skip_all, fields(chapter = %target.chapter.id))]
    pub async fn load(&self, target: &ChapterTarget, layout: &Layout) -> Result<Arc<PageData>> {
        loop {
            match self.slot(&target.chapter.id, &layout.key()) {
                Slot::Ready(data) => return Ok(data),
                Slot::Busy(mut done) => {
                    tracing::trace!(chapter = %target.chapter.id, "Waiting for in-flight chapter load");
                    _ = done.changed().await;
                },
                Slot::Claimed(claim) => return self.materialize(target, layout, claim).await,
            }
        }
    }

    /// Split `target` again for `layout`, even if valid pages are resident.
    ///
    /// Reuses the resident text when there is one; only fetches otherwise.
    #[instrument(skip_all, fields(chapter = %target.chapter.id))]
    pub async fn resplit(&self, target: &ChapterTarget, layout: &Layout) -> Result<Arc<PageData>> {
        let claim = loop {
            match self.try_claim(&target.chapter.id) {
                Ok(claim) => break claim,
                Err(mut done) => {
                    _ = done.changed().await;
                },
            }
        };
        self.materialize(target, layout, claim).await
    }

    async fn prefetch(&self, target: &ChapterTarget) -> Result<Preloaded> {
        let id = &target.chapter.id;
        let Ok(_claim) = self.try_claim(id) else {
            return Ok(Preloaded::InFlight);
        };
        if self.content(id).is_none() {
            let content = self.fetch(id).await?;
            let cached = CachedChapter {
                index: target.index(),
                chapter: target.chapter.clone(),
                content,
                page_data: None,
            };
            let evicted = lock(&self.inner).put(cached, self.capacity);
            for chapter in evicted {
                tracing::debug!(chapter = %chapter, "Evicted chapter over capacity");
            }
        }
        Ok(Preloaded::Fetched)
    }

    async fn fetch(&self, id: &ChapterId) -> Result<Arc<str>> {
        let fetched = self.source.chapter_content(id).await.or_raise(|| ErrorKind::Fetch(id.clone()))?;
        tracing::debug!(chapter = %id, bytes = fetched.content.len(), "Fetched chapter content");
        Ok(fetched.content)
    }

    fn slot(&self, id: &ChapterId, key: &LayoutKey) -> Slot<'_> {
        let mut inner = lock(&self.inner);
        if let Some(data) = inner.valid_page_data(id, key) {
            return Slot::Ready(data);
        }
        if let Some(done) = inner.in_flight.get(id) {
            return Slot::Busy(done.clone());
        }
        Slot::Claimed(self.claim_locked(&mut inner, id))
    }

    fn try_claim(&self, id: &ChapterId) -> std::result::Result<Claim<'_>, watch::Receiver<()>> {
        let mut inner = lock(&self.inner);
        match inner.in_flight.get(id) {
            Some(done) => Err(done.clone()),
            None => Ok(self.claim_locked(&mut inner, id)),
        }
    }

    fn claim_locked(&self, inner: &mut Inner, id: &ChapterId) -> Claim<'_> {
        let (done, waiting) = watch::channel(());
        inner.in_flight.insert(id.clone(), waiting);
        Claim {
            inner: &self.inner,
            id: id.clone(),
            _done: done,
        }
    }

    /// Fetch (unless resident), split and insert. The claim is released when
    /// this returns, after the insert.
    async fn materialize(&self, target: &ChapterTarget, layout: &Layout, _claim: Claim<'_>) -> Result<Arc<PageData>> {
        let id = &target.chapter.id;
        if !layout.is_ready() {
            exn::bail!(ErrorKind::LayoutNotReady);
        }
        let content = match self.content(id) {
            Some(content) => content,
            None => self.fetch(id).await?,
        };
        let text = content.clone();
        let owned = layout.clone();
        let pages = tokio::task::spawn_blocking(move || pageturn_layout::split(&text, &owned))
            .await
            .or_raise(|| ErrorKind::Aborted(id.clone()))?
            .or_raise(|| ErrorKind::LayoutNotReady)?;
        Ok(self.insert(target, content, pages, layout.key()))
    }

    fn insert(&self, target: &ChapterTarget, content: Arc<str>, pages: Vec<String>, key: LayoutKey) -> Arc<PageData> {
        let index = target.index();
        let id = &target.chapter.id;
        let mut inner = lock(&self.inner);
        let previous = inner.neighbour(index.checked_sub(1), &key);
        let next = inner.neighbour(index.checked_add(1), &key);
        let data = PageData::new(id.clone(), pages, target.position, target.book_info.clone(), key);
        let data = match (&previous, &next) {
            (None, None) => Arc::new(data),
            _ => Arc::new(data.with_adjacent(previous.as_ref(), next.as_ref())),
        };
        let cached = CachedChapter {
            index,
            chapter: target.chapter.clone(),
            content,
            page_data: Some(data.clone()),
        };
        let evicted = inner.put(cached, self.capacity);
        drop(inner);
        for chapter in evicted {
            tracing::debug!(chapter = %chapter, "Evicted chapter over capacity");
        }
        data
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Replace the page data of a resident chapter (e.g. with adjacent
    /// context attached). Returns `false` if the chapter is not resident.
    pub fn set_page_data(&self, id: &ChapterId, data: Arc<PageData>) -> bool {
        let mut inner = lock(&self.inner);
        let tick = inner.next_tick();
        match inner.entries.get_mut(id) {
            Some(entry) => {
                entry.cached.page_data = Some(data);
                entry.touched = tick;
                true
            },
            None => false,
        }
    }

    pub fn evict(&self, id: &ChapterId) -> bool {
        lock(&self.inner).entries.remove(id).is_some()
    }

    /// Protect chapters with an index in `window` from capacity eviction.
    pub fn set_window(&self, window: RangeInclusive<usize>) {
        lock(&self.inner).window = Some(window);
    }

    /// Protect `window` and evict every resident chapter outside it.
    pub fn retain_window(&self, window: RangeInclusive<usize>) -> Vec<ChapterId> {
        let mut inner = lock(&self.inner);
        let evicted: Vec<_> = inner
            .entries
            .iter()
            .filter(|(_, entry)| !window.contains(&entry.cached.index))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &evicted {
            inner.entries.remove(id);
        }
        inner.window = Some(window);
        evicted
    }
}
