//! The reading session: single owner of the reader state.
//!
//! Foreground transitions (flip, seek, settings) run on `&mut self` and
//! commit their new snapshot before returning. Background work (preload,
//! whole-book pagination) runs on spawned tasks that report back over a
//! channel; the host applies those results with
//! [`apply_pending()`](ReaderSession::apply_pending) or
//! [`next_update()`](ReaderSession::next_update), in order, on the same
//! owner.

use crate::error::{ErrorKind, Result};
use crate::flip::{FlipDirection, FlipEngine, FlipOutcome};
use crate::paginate::{PaginationEvent, PaginationJob, PaginationOptions, PaginationService};
use crate::preload::{PreloadManager, PreloadReport};
use crate::progress::ProgressTracker;
use crate::seek::{SeekOutcome, SeekProgress};
use crate::settings::{RepaginationTier, SettingsUpdateCoordinator};
use crate::state::ReaderState;
use crate::switch::{Landing, switch_chapter};
use crate::virtual_pages::VirtualPageBuilder;
use exn::ResultExt;
use pageturn_cache::ChapterCache;
use pageturn_config::EngineConfig;
use pageturn_layout::models::{BookId, ContainerSize, Layout, PagePosition, ReaderSettings, into_reading_order};
use pageturn_source::{ProgressStore, ResilientSource, RetryPolicy, SettingsStore, SourceHandle, StoreHandle};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::instrument;

/// A result of background work, applied to the state in arrival order.
#[derive(Debug, Clone)]
pub enum BackgroundUpdate {
    Preloaded(PreloadReport),
    Pagination(PaginationEvent),
}

struct Tagged {
    generation: u64,
    update: BackgroundUpdate,
}

pub struct ReaderSession {
    state: ReaderState,
    cache: Arc<ChapterCache>,
    config: EngineConfig,
    builder: VirtualPageBuilder,
    flip: FlipEngine,
    seek: SeekProgress,
    settings: SettingsUpdateCoordinator,
    progress: ProgressTracker,
    settings_store: Option<SettingsStore>,
    preload: Arc<Mutex<PreloadManager>>,
    preload_job: Option<JoinHandle<()>>,
    pagination: PaginationService,
    /// Bumped by [`cancel()`](Self::cancel); results from older generations
    /// are dropped.
    generation: u64,
    updates_tx: mpsc::UnboundedSender<Tagged>,
    updates_rx: mpsc::UnboundedReceiver<Tagged>,
}

impl ReaderSession {
    /// Open `book_id` for reading.
    ///
    /// Fetches the chapter list (required) and book info (optional), restores
    /// the saved position from `store` if there is one, and, once `layout` is
    /// ready, loads the chapter at that position. Preloading around it starts
    /// either way; before the container is measured it only fetches text, and
    /// the first [`resize()`](Self::resize) to a measured container splits it.
    ///
    /// When `layout` carries [`ReaderSettings::default()`] the settings saved
    /// in `store` are used instead. Hosts that pass their own settings own
    /// restoring them.
    #[instrument(skip_all, fields(book = %book_id, source = source.name()))]
    pub async fn open(
        book_id: BookId,
        source: SourceHandle,
        layout: Layout,
        config: EngineConfig,
        store: Option<StoreHandle>,
    ) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Config)?;
        let policy = RetryPolicy {
            retries: config.io.retries,
            delay: config.io.retry_delay(),
            timeout: config.io.timeout(),
        };
        let source: SourceHandle = Arc::new(ResilientSource::new(source, policy));

        let chapters = source.chapter_list(&book_id).await.or_raise(|| ErrorKind::Source(book_id.clone()))?;
        if chapters.is_empty() {
            exn::bail!(ErrorKind::EmptyBook(book_id));
        }
        let chapters = into_reading_order(chapters);
        let book_info = match source.book_info(&book_id).await {
            Ok(info) => Some(Arc::new(info)),
            Err(err) => {
                tracing::warn!(error = ?err, "Book info unavailable, opening without detail page");
                None
            },
        };

        let mut layout = layout;
        if layout.settings == ReaderSettings::default()
            && let Some(store) = &store
        {
            match SettingsStore::new(store.clone()).load().await {
                Ok(saved) => layout.settings = saved,
                Err(err) => tracing::warn!(error = ?err, "Failed to load reader settings"),
            }
        }

        let progress = ProgressTracker::new(store.clone().map(ProgressStore::new));
        let mut state = ReaderState::new(book_id.clone(), chapters, book_info, &layout);
        if let Some(record) = progress.load(&book_id).await {
            let index = state
                .chapter_index_of(&record.chapter_id)
                .or_else(|| (record.chapter_index < state.chapters.len()).then_some(record.chapter_index));
            match index {
                Some(index) => {
                    state.current_chapter_index = index;
                    state.current_page = PagePosition::from_raw(record.page_index);
                },
                None => tracing::warn!(chapter = %record.chapter_id, "Saved position is not part of this book"),
            }
        }
        if layout.is_ready()
            && let Some(store) = progress.store()
        {
            match store.load_page_counts(&book_id, &layout.key()).await {
                Ok(index) => state.page_counts = index.map(Arc::new),
                Err(err) => tracing::warn!(error = ?err, "Failed to load persisted page counts"),
            }
        }

        let builder = VirtualPageBuilder::new(config.virtual_pages.radius);
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let mut session = Self {
            cache: Arc::new(ChapterCache::new(source, config.cache.capacity)),
            builder,
            flip: FlipEngine::new(config.flip.cooldown(), builder),
            seek: SeekProgress::new(builder),
            settings: SettingsUpdateCoordinator::new(builder),
            progress,
            settings_store: store.map(SettingsStore::new),
            preload: Arc::new(Mutex::new(PreloadManager::from_config(&config.preload))),
            preload_job: None,
            pagination: PaginationService::new(),
            generation: 0,
            updates_tx,
            updates_rx,
            config,
            state,
        };
        if layout.is_ready() {
            let anchor = Landing::At(session.state.current_page);
            let index = session.state.current_chapter_index;
            session.state = switch_chapter(&session.cache, &builder, &session.state, index, anchor).await?;
        }
        session.schedule_preload(false);
        tracing::info!(
            chapters = session.state.chapters.len(),
            chapter = session.state.current_chapter_index,
            page = session.state.current_page.as_raw(),
            "Opened book"
        );
        Ok(session)
    }

    pub fn state(&self) -> &ReaderState {
        &self.state
    }

    pub fn cache(&self) -> &Arc<ChapterCache> {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether a preload pass or a pagination build is still running.
    pub fn is_busy(&self) -> bool {
        self.preload_job.as_ref().is_some_and(|job| !job.is_finished()) || self.pagination.is_running()
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Flip one page. A chapter switch (or a flip onto a chapter boundary)
    /// starts a preload pass around the new position.
    pub async fn flip(&mut self, direction: FlipDirection) -> Result<FlipOutcome> {
        let outcome = self.flip.flip(&self.cache, &self.state, direction, Instant::now()).await?;
        match &outcome {
            FlipOutcome::NoOp => {},
            FlipOutcome::PageChanged {
                state,
                needs_preload_check,
            } => {
                self.commit(state.clone());
                if *needs_preload_check {
                    self.schedule_preload(false);
                }
            },
            FlipOutcome::NeedsVirtualPageRebuild { state } => {
                let rebuilt = self.builder.apply(state, false)?;
                self.commit(rebuilt);
                self.schedule_preload(false);
            },
            FlipOutcome::ChapterSwitched { state } => {
                self.commit(state.clone());
                self.schedule_preload(false);
            },
        }
        Ok(outcome)
    }

    /// Jump to `progress` (`0.0..=1.0`) through the book. Needs a page-count
    /// index for the current layout, see
    /// [`start_pagination()`](Self::start_pagination).
    pub async fn seek(&mut self, progress: f32) -> Result<SeekOutcome> {
        let outcome = self.seek.execute(&self.cache, &self.state, progress).await?;
        if let SeekOutcome::Moved { state } = &outcome {
            self.commit(state.clone());
            self.schedule_preload(false);
        }
        Ok(outcome)
    }

    fn commit(&mut self, state: ReaderState) {
        self.state = state;
        self.progress.save(&self.state);
    }

    /// Wait until every progress save made so far has been written.
    pub async fn flush(&mut self) {
        self.progress.flush().await;
    }

    // =========================================================================
    // Layout
    // =========================================================================

    /// Apply new reader settings, repaginating when they change the pages.
    pub async fn update_settings(&mut self, settings: ReaderSettings) -> RepaginationTier {
        let update = self.settings.apply(&self.cache, &self.state, settings).await;
        self.state = update.state;
        if let Some(store) = self.settings_store.clone() {
            let settings = self.state.settings.clone();
            tokio::spawn(async move {
                if let Err(err) = store.save(&settings).await {
                    tracing::warn!(error = ?err, "Failed to save reader settings");
                }
            });
        }
        if update.tier != RepaginationTier::NotNeeded {
            self.schedule_preload(false);
        }
        update.tier
    }

    /// Apply a new container size.
    pub async fn resize(&mut self, container: ContainerSize) -> RepaginationTier {
        let update = self.settings.resize(&self.cache, &self.state, container).await;
        self.state = update.state;
        if update.tier != RepaginationTier::NotNeeded {
            self.schedule_preload(false);
        }
        update.tier
    }

    // =========================================================================
    // Background work
    // =========================================================================

    /// Preload with the expanded radius, e.g. while the reader flips fast.
    pub fn expand_preload(&mut self) {
        self.schedule_preload(true);
    }

    fn schedule_preload(&mut self, expand: bool) {
        if let Some(job) = self.preload_job.take() {
            job.abort();
        }
        let manager = self.preload.clone();
        let cache = self.cache.clone();
        let state = self.state.clone();
        let updates = self.updates_tx.clone();
        let generation = self.generation;
        self.preload_job = Some(tokio::spawn(async move {
            let report = manager.lock().await.run(&cache, &state, expand).await;
            if let Some(report) = report {
                _ = updates.send(Tagged {
                    generation,
                    update: BackgroundUpdate::Preloaded(report),
                });
            }
        }));
    }

    /// Build (or reload) the whole-book page-count index for the current
    /// layout in the background, replacing any build still running.
    pub fn start_pagination(&mut self) {
        let options = PaginationOptions {
            existing: self.state.page_counts.clone(),
            ..PaginationOptions::from_config(&self.config.pagination, &self.config.io)
        };
        let job = PaginationJob {
            cache: self.cache.clone(),
            book_id: self.state.book_id.clone(),
            chapters: self.state.chapters.clone(),
            layout: self.state.layout(),
            options,
            store: self.progress.store().cloned(),
        };
        let updates = self.updates_tx.clone();
        let generation = self.generation;
        self.pagination.start(job, move |event| {
            _ = updates.send(Tagged {
                generation,
                update: BackgroundUpdate::Pagination(event),
            });
        });
    }

    /// Apply every background result that has arrived so far. Returns how
    /// many were applied.
    pub fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(tagged) = self.updates_rx.try_recv() {
            if self.apply_tagged(tagged).is_some() {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next background result, apply it and return it.
    ///
    /// Waits indefinitely when nothing is running.
    pub async fn next_update(&mut self) -> Option<BackgroundUpdate> {
        loop {
            let tagged = self.updates_rx.recv().await?;
            if let Some(update) = self.apply_tagged(tagged) {
                return Some(update);
            }
        }
    }

    fn apply_tagged(&mut self, tagged: Tagged) -> Option<BackgroundUpdate> {
        if tagged.generation != self.generation {
            tracing::trace!(generation = tagged.generation, "Dropping stale background result");
            return None;
        }
        match &tagged.update {
            BackgroundUpdate::Preloaded(report) => {
                self.state = report.apply(&self.state, &self.builder);
            },
            BackgroundUpdate::Pagination(PaginationEvent::Skipped(index)) => {
                if index.is_valid_for(&self.state.book_id, &self.state.layout_key()) {
                    self.state.page_counts = Some(index.clone());
                }
            },
            BackgroundUpdate::Pagination(PaginationEvent::Complete(index)) => {
                if index.is_valid_for(&self.state.book_id, &self.state.layout_key()) {
                    self.state.page_counts = Some(Arc::new(index.clone()));
                }
            },
            BackgroundUpdate::Pagination(_) => {},
        }
        Some(tagged.update)
    }

    /// Abort all background work. Results already queued are dropped.
    pub fn cancel(&mut self) {
        if let Some(job) = self.preload_job.take() {
            job.abort();
        }
        self.pagination.cancel();
        self.generation += 1;
    }
}

impl Drop for ReaderSession {
    fn drop(&mut self) {
        self.cancel();
    }
}
