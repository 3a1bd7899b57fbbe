use crate::error::{ErrorKind, Result};
use crate::paginate::{PaginationEvent, PaginationOptions};
use async_stream::stream;
use exn::ResultExt;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use pageturn_cache::ChapterCache;
use pageturn_layout::models::{BookId, Chapter, Layout, PageCountCacheData};
use std::sync::Arc;
use tracing::instrument;

/// Streams [`PaginationEvent`]s while counting the pages of every chapter of
/// `chapters` for `layout`.
///
/// Page counts come from resident page data when the cache has it for this
/// layout, otherwise from the resident text, otherwise from the source.
/// Text fetched only for counting is not inserted into the cache, so a full
/// build never pushes the reader's own chapters out. Up to
/// `options.concurrency` chapters are processed at once.
///
/// A chapter that cannot be counted is surfaced as an `Err` item without
/// terminating the stream; [`Complete`](PaginationEvent::Complete) is then
/// never emitted. A layout without a measured container is fatal.
pub fn build_global_index<'a>(
    cache: &'a ChapterCache,
    book_id: &'a BookId,
    chapters: &'a [Chapter],
    layout: &'a Layout,
    options: &'a PaginationOptions,
) -> impl Stream<Item = Result<PaginationEvent>> + 'a {
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        yield Ok(PaginationEvent::Started);

        let key = layout.key();
        if let Some(existing) = options.existing.as_ref().filter(|index| index.is_valid_for(book_id, &key)) {
            tracing::debug!(book = %book_id, total = existing.total_pages, "Reusing page-count index");
            yield Ok(PaginationEvent::Skipped(existing.clone()));
            return;
        }
        if !layout.is_ready() {
            yield Err(exn::Exn::from(ErrorKind::LayoutNotReady));
            return;
        }
        yield Ok(PaginationEvent::DiscoveryComplete(chapters.len()));

        let mut futures: Vec<_> = chapters
            .iter()
            .enumerate()
            .map(|(index, chapter)| async move { (index, count_pages(cache, chapter, layout, options).await) })
            .collect();
        let mut processing = FuturesUnordered::new();
        processing.extend(futures.drain(..options.concurrency.max(1).min(futures.len())));
        let mut counts: Vec<Option<usize>> = vec![None; chapters.len()];
        while let Some((index, result)) = processing.next().await {
            match result {
                Ok(pages) => {
                    counts[index] = Some(pages);
                    yield Ok(PaginationEvent::Counted {
                        index,
                        chapter_id: chapters[index].id.clone(),
                        pages,
                    });
                },
                Err(err) => yield Err(err),
            }
            // Pop-n-push, but FIFO instead of LIFO.
            if !futures.is_empty() {
                processing.push(futures.remove(0));
            }
        }

        let counted: Option<Vec<_>> = chapters
            .iter()
            .zip(counts)
            .map(|(chapter, count)| Some((chapter.id.clone(), count?)))
            .collect();
        match counted {
            Some(counted) => {
                let index = PageCountCacheData::new(book_id.clone(), key, counted);
                tracing::info!(book = %book_id, total = index.total_pages, "Built page-count index");
                yield Ok(PaginationEvent::Complete(index));
            },
            None => tracing::debug!(book = %book_id, "Page-count index incomplete"),
        }
    })
}

#[instrument(skip_all, fields(chapter = %chapter.id))]
async fn count_pages(
    cache: &ChapterCache,
    chapter: &Chapter,
    layout: &Layout,
    options: &PaginationOptions,
) -> Result<usize> {
    if let Some(data) = cache.page_data(&chapter.id, &layout.key()) {
        return Ok(data.page_count());
    }
    let content = match cache.content(&chapter.id) {
        Some(content) => content,
        None => fetch(cache, chapter, options).await?,
    };
    let owned = layout.clone();
    let pages = tokio::task::spawn_blocking(move || pageturn_layout::split(&content, &owned))
        .await
        .or_raise(|| ErrorKind::ChapterLoad(chapter.id.clone()))?
        .or_raise(|| ErrorKind::LayoutNotReady)?;
    Ok(pages.len())
}

async fn fetch(cache: &ChapterCache, chapter: &Chapter, options: &PaginationOptions) -> Result<Arc<str>> {
    let mut attempt = 0;
    loop {
        match cache.source().chapter_content(&chapter.id).await {
            Ok(fetched) => return Ok(fetched.content),
            Err(err) if err.is_retryable() && attempt < options.retries => {
                attempt += 1;
                tracing::debug!(chapter = %chapter.id, attempt, error = ?err, "Retrying chapter fetch for page count");
                tokio::time::sleep(options.retry_delay).await;
            },
            Err(err) => return Err(err).or_raise(|| ErrorKind::ChapterLoad(chapter.id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{layout, source};
    use pageturn_cache::{ChapterTarget, DEFAULT_CAPACITY};
    use pageturn_layout::models::{ChapterId, ContainerSize};
    use pageturn_source::ContentSource;
    use pageturn_source::content::MockSource;
    use pageturn_source::error::ErrorKind as SourceErrorKind;

    struct Book {
        source: Arc<MockSource>,
        cache: ChapterCache,
        book_id: BookId,
        chapters: Vec<Chapter>,
    }

    async fn book(pages: &[usize]) -> Book {
        let source = source(pages);
        let cache = ChapterCache::new(source.clone(), DEFAULT_CAPACITY);
        let book_id = BookId::from("book");
        let chapters = source.chapter_list(&book_id).await.unwrap();
        Book {
            source,
            cache,
            book_id,
            chapters,
        }
    }

    async fn events(book: &Book, layout: &Layout, options: &PaginationOptions) -> Vec<Result<PaginationEvent>> {
        build_global_index(&book.cache, &book.book_id, &book.chapters, layout, options).collect().await
    }

    #[tokio::test]
    async fn counts_every_chapter() {
        let book = book(&[2, 3, 1]).await;
        let events = events(&book, &layout(), &PaginationOptions::default()).await;
        let events: Vec<_> = events.into_iter().map(|event| event.unwrap()).collect();
        assert_eq!(events[0], PaginationEvent::Started);
        assert_eq!(events[1], PaginationEvent::DiscoveryComplete(3));
        let mut counted: Vec<_> = events[2..5]
            .iter()
            .map(|event| match event {
                PaginationEvent::Counted { index, pages, .. } => (*index, *pages),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        counted.sort_unstable();
        assert_eq!(counted, vec![(0, 2), (1, 3), (2, 1)]);
        let PaginationEvent::Complete(index) = &events[5] else {
            panic!("expected completion, got {:?}", events[5]);
        };
        assert_eq!(index.total_pages, 6);
        assert_eq!(index.find_chapter_by_absolute_page(3), Some((ChapterId::from("c1"), 1)));
        assert!(book.cache.is_empty());
    }

    #[tokio::test]
    async fn resident_chapters_are_not_fetched_again() {
        let book = book(&[2, 3]).await;
        let target = ChapterTarget::at(&book.chapters, 0, None).unwrap();
        book.cache.load(&target, &layout()).await.unwrap();
        let events = events(&book, &layout(), &PaginationOptions::default()).await;
        assert!(matches!(events.last(), Some(Ok(PaginationEvent::Complete(_)))));
        assert_eq!(book.source.content_fetches(&ChapterId::from("c0")).await, 1);
        assert_eq!(book.cache.len(), 1);
    }

    #[tokio::test]
    async fn valid_existing_index_is_reused() {
        let book = book(&[2, 3]).await;
        let existing = Arc::new(PageCountCacheData::new(
            book.book_id.clone(),
            layout().key(),
            vec![(ChapterId::from("c0"), 7), (ChapterId::from("c1"), 1)],
        ));
        let options = PaginationOptions {
            existing: Some(existing.clone()),
            ..PaginationOptions::default()
        };
        let events: Vec<_> = events(&book, &layout(), &options).await.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events, vec![PaginationEvent::Started, PaginationEvent::Skipped(existing)]);
        assert_eq!(book.source.total_content_fetches().await, 0);
    }

    #[tokio::test]
    async fn stale_existing_index_is_rebuilt() {
        let book = book(&[2]).await;
        let other = crate::testing::layout_with(10).key();
        let options = PaginationOptions {
            existing: Some(Arc::new(PageCountCacheData::new(book.book_id.clone(), other, vec![]))),
            ..PaginationOptions::default()
        };
        let events = events(&book, &layout(), &options).await;
        assert!(matches!(events.last(), Some(Ok(PaginationEvent::Complete(index))) if index.total_pages == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failures_are_retried() {
        let book = book(&[2, 3]).await;
        book.source.fail_next(&ChapterId::from("c1"), 1, SourceErrorKind::Network("reset".into())).await;
        let events = events(&book, &layout(), &PaginationOptions::default()).await;
        assert!(matches!(events.last(), Some(Ok(PaginationEvent::Complete(_)))));
        assert_eq!(book.source.content_fetches(&ChapterId::from("c1")).await, 2);
    }

    #[tokio::test]
    async fn failed_chapter_prevents_completion() {
        let book = book(&[2, 3, 4]).await;
        book.source.fail_next(&ChapterId::from("c1"), 1, SourceErrorKind::NotFound("c1".into())).await;
        let events = events(&book, &layout(), &PaginationOptions::default()).await;
        let failures: Vec<_> = events.iter().filter_map(|event| event.as_ref().err()).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(**failures[0], ErrorKind::ChapterLoad(ChapterId::from("c1")));
        assert!(!events.iter().any(|event| matches!(event, Ok(PaginationEvent::Complete(_)))));
        assert_eq!(events.iter().filter(|event| matches!(event, Ok(PaginationEvent::Counted { .. }))).count(), 2);
    }

    #[tokio::test]
    async fn unready_layout_is_fatal() {
        let book = book(&[2]).await;
        let unready = Layout::new(ContainerSize::new(0, 0), layout().settings, 1.0);
        let events = events(&book, &unready, &PaginationOptions::default()).await;
        assert_eq!(events.len(), 2);
        assert_eq!(**events[1].as_ref().unwrap_err(), ErrorKind::LayoutNotReady);
    }
}
