//! Reading progress persistence.

use crate::error::{ErrorKind, Result};
use crate::state::ReaderState;
use exn::OptionExt;
use pageturn_layout::models::{BookId, PagePosition};
use pageturn_source::ProgressStore;
use pageturn_source::models::ProgressRecord;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Whole-book progress of `state`, `0.0..=1.0`.
///
/// Uses the page-count index when it is valid for the current layout,
/// otherwise estimates from the chapter position: every chapter counts the
/// same, and the current one counts as far as its page. The detail page is
/// the start of the book.
pub fn computed_progress(state: &ReaderState) -> f32 {
    let PagePosition::Page(page) = state.current_page else {
        return 0.0;
    };
    let Some(chapter) = state.current_chapter() else {
        return 0.0;
    };
    if let Some(progress) = state.valid_page_counts().and_then(|index| index.progress_of(&chapter.id, page)) {
        return progress;
    }
    let total = state.chapters.len() as f32;
    let within = match state.resolved(&chapter.id) {
        Some(data) if data.page_count() > 0 => (page.min(data.last_page_index()) + 1) as f32 / data.page_count() as f32,
        _ => 0.0,
    };
    ((state.current_chapter_index as f32 + within) / total).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSaveReport {
    pub saved: usize,
    /// Books whose record could not be written.
    pub failed: Vec<BookId>,
}

/// Builds and persists progress records. Without a store every save is a
/// no-op.
///
/// Saves of one tracker are written in the order they were made, so the
/// stored record is always the latest position.
#[derive(Default)]
pub struct ProgressTracker {
    store: Option<ProgressStore>,
    /// Last write of the chain; each write waits for the one before it.
    pending: Option<JoinHandle<()>>,
}

impl ProgressTracker {
    pub fn new(store: Option<ProgressStore>) -> Self {
        Self { store, pending: None }
    }

    pub fn store(&self) -> Option<&ProgressStore> {
        self.store.as_ref()
    }

    /// Record of the current reading position.
    pub fn record(&self, state: &ReaderState) -> Result<ProgressRecord> {
        let chapter = state.current_chapter().ok_or_raise(|| ErrorKind::MissingCurrentChapter)?;
        Ok(ProgressRecord {
            book_id: state.book_id.clone(),
            chapter_id: chapter.id.clone(),
            chapter_index: state.current_chapter_index,
            page_index: state.current_page.as_raw(),
            progress: computed_progress(state),
            flip_effect: state.settings.flip_effect,
            saved_at: OffsetDateTime::now_utc(),
        })
    }

    /// Persist the current position in the background, after every earlier
    /// save. Failures are logged. Returns whether a write was queued.
    pub fn save(&mut self, state: &ReaderState) -> bool {
        let Some(store) = self.store.clone() else {
            return false;
        };
        let record = match self.record(state) {
            Ok(record) => record,
            Err(err) => {
                tracing::debug!(book = %state.book_id, error = ?err, "Nothing to save");
                return false;
            },
        };
        let previous = self.pending.take();
        self.pending = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                _ = previous.await;
            }
            if let Err(err) = store.save_progress(&record).await {
                tracing::warn!(book = %record.book_id, error = ?err, "Failed to save reading progress");
            }
        }));
        true
    }

    /// Wait until every queued save has been written.
    pub async fn flush(&mut self) {
        if let Some(pending) = self.pending.take() {
            _ = pending.await;
        }
    }

    /// Last saved position for `book`, if any. Unreadable records count as
    /// missing.
    pub async fn load(&self, book: &BookId) -> Option<ProgressRecord> {
        let store = self.store.as_ref()?;
        match store.load_progress(book).await {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(book = %book, error = ?err, "Failed to load reading progress");
                None
            },
        }
    }

    /// Persist several records, e.g. when a host flushes on shutdown.
    pub async fn batch_save(&self, records: &[ProgressRecord]) -> BatchSaveReport {
        let mut report = BatchSaveReport::default();
        let Some(store) = &self.store else {
            report.failed = records.iter().map(|record| record.book_id.clone()).collect();
            return report;
        };
        for record in records {
            match store.save_progress(record).await {
                Ok(()) => report.saved += 1,
                Err(err) => {
                    tracing::warn!(book = %record.book_id, error = ?err, "Failed to save reading progress");
                    report.failed.push(record.book_id.clone());
                },
            }
        }
        report
    }
}
