use crate::paginate::{PaginationEvent, PaginationOptions, build_global_index};
use futures::StreamExt;
use pageturn_cache::ChapterCache;
use pageturn_layout::models::{BookId, Chapter, Layout};
use pageturn_source::ProgressStore;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Everything a background index build needs, owned.
#[derive(Clone)]
pub struct PaginationJob {
    pub cache: Arc<ChapterCache>,
    pub book_id: BookId,
    pub chapters: Arc<[Chapter]>,
    pub layout: Layout,
    pub options: PaginationOptions,
    /// Where finished indexes are persisted and looked up.
    pub store: Option<ProgressStore>,
}

/// Runs at most one global index build at a time.
///
/// Starting a build cancels the one before it; dropping the service cancels
/// whatever is running.
#[derive(Default)]
pub struct PaginationService {
    job: Option<JoinHandle<()>>,
}

impl PaginationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building the index described by `job`, cancelling any previous
    /// build. Events are handed to `on_event` as they happen; failures of
    /// single chapters are logged.
    ///
    /// A persisted index for the same book and layout is reused instead of
    /// recounting, and a freshly completed index is persisted before
    /// [`Complete`](PaginationEvent::Complete) is reported.
    pub fn start<F>(&mut self, job: PaginationJob, mut on_event: F)
    where
        F: FnMut(PaginationEvent) + Send + 'static,
    {
        self.cancel();
        let handle = tokio::spawn(async move {
            let PaginationJob {
                cache,
                book_id,
                chapters,
                layout,
                mut options,
                store,
            } = job;
            let key = layout.key();
            let reusable = options.existing.as_ref().is_some_and(|index| index.is_valid_for(&book_id, &key));
            if !reusable && let Some(store) = &store {
                match store.load_page_counts(&book_id, &key).await {
                    Ok(Some(index)) => options.existing = Some(Arc::new(index)),
                    Ok(None) => {},
                    Err(err) => tracing::warn!(book = %book_id, error = ?err, "Failed to load persisted page counts"),
                }
            }

            let events = build_global_index(&cache, &book_id, &chapters, &layout, &options);
            let mut events = std::pin::pin!(events);
            while let Some(event) = events.next().await {
                match event {
                    Ok(PaginationEvent::Complete(index)) => {
                        if let Some(store) = &store
                            && let Err(err) = store.save_page_counts(&index).await
                        {
                            tracing::warn!(book = %book_id, error = ?err, "Failed to persist page counts");
                        }
                        on_event(PaginationEvent::Complete(index));
                    },
                    Ok(event) => on_event(event),
                    Err(err) => tracing::warn!(book = %book_id, error = ?err, "Page counting failed"),
                }
            }
        });
        self.job = Some(handle);
    }

    /// Abort the running build, if any.
    pub fn cancel(&mut self) {
        if let Some(job) = self.job.take() {
            job.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.job.as_ref().is_some_and(|job| !job.is_finished())
    }

    /// Wait for the running build to finish.
    pub async fn join(&mut self) {
        if let Some(job) = self.job.take() {
            _ = job.await;
        }
    }
}

impl Drop for PaginationService {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{layout, source};
    use pageturn_cache::DEFAULT_CAPACITY;
    use pageturn_layout::models::{ChapterId, PageCountCacheData};
    use pageturn_source::content::MockSource;
    use pageturn_source::{ContentSource, MemoryStore};
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn job(source: Arc<MockSource>, store: Option<ProgressStore>) -> PaginationJob {
        let book_id = BookId::from("book");
        let chapters = source.chapter_list(&book_id).await.unwrap();
        PaginationJob {
            cache: Arc::new(ChapterCache::new(source, DEFAULT_CAPACITY)),
            book_id,
            chapters: chapters.into(),
            layout: layout(),
            options: PaginationOptions::default(),
            store,
        }
    }

    fn collect() -> (impl FnMut(PaginationEvent) + Send + 'static, mpsc::UnboundedReceiver<PaginationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            move |event| {
                _ = tx.send(event);
            },
            rx,
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PaginationEvent>) -> Vec<PaginationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn completed_index_is_persisted() {
        let store = ProgressStore::new(Arc::new(MemoryStore::default()));
        let mut service = PaginationService::new();
        let (on_event, mut rx) = collect();
        service.start(job(source(&[2, 3]), Some(store.clone())).await, on_event);
        service.join().await;
        assert!(!service.is_running());

        let events = drain(&mut rx);
        let Some(PaginationEvent::Complete(index)) = events.last() else {
            panic!("expected completion, got {events:?}");
        };
        assert_eq!(index.total_pages, 5);
        let persisted = store.load_page_counts(&BookId::from("book"), &layout().key()).await.unwrap();
        assert_eq!(persisted.as_ref(), Some(index));
    }

    #[tokio::test]
    async fn persisted_index_is_reused() {
        let store = ProgressStore::new(Arc::new(MemoryStore::default()));
        let stored =
            PageCountCacheData::new(BookId::from("book"), layout().key(), vec![(ChapterId::from("c0"), 9)]);
        store.save_page_counts(&stored).await.unwrap();
        let source = source(&[2, 3]);
        let mut service = PaginationService::new();
        let (on_event, mut rx) = collect();
        service.start(job(source.clone(), Some(store)).await, on_event);
        service.join().await;

        let events = drain(&mut rx);
        assert_eq!(events, vec![PaginationEvent::Started, PaginationEvent::Skipped(Arc::new(stored))]);
        assert_eq!(source.total_content_fetches().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_cancels_previous_build() {
        let slow = Arc::new(
            MockSource::with_chapters("book", [("c0", crate::testing::text(2))]).with_latency(Duration::from_secs(5)),
        );
        let mut service = PaginationService::new();
        let (first, mut first_rx) = collect();
        service.start(job(slow.clone(), None).await, first);
        let (second, mut second_rx) = collect();
        service.start(job(source(&[1]), None).await, second);
        service.join().await;

        assert!(!drain(&mut first_rx).iter().any(|event| matches!(event, PaginationEvent::Complete(_))));
        assert!(matches!(drain(&mut second_rx).last(), Some(PaginationEvent::Complete(_))));
    }
}
