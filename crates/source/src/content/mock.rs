//! In-memory content source for testing.

use crate::content::ContentSource;
use crate::error::{ErrorKind, Result};
use crate::models::ChapterContent;
use async_trait::async_trait;
use pageturn_layout::models::{BookId, BookInfo, Chapter, ChapterId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Default)]
struct Ledger {
    fetches: HashMap<ChapterId, usize>,
    failures: HashMap<ChapterId, (usize, ErrorKind)>,
}

/// In-memory content source for testing.
///
/// Holds a single book. Counts every content fetch per chapter (including
/// failed ones), can inject a number of failures for a chapter, and can
/// simulate a slow upstream with a fixed latency per call.
///
/// # Examples
///
/// ```
/// use pageturn_layout::models::ChapterId;
/// use pageturn_source::content::{ContentSource, MockSource};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = MockSource::with_chapters("book", [("c1", "Once upon a time"), ("c2", "The end")]);
/// let chapter = source.chapter_content(&ChapterId::from("c2")).await.unwrap();
/// assert_eq!(&*chapter.content, "The end");
/// assert_eq!(source.content_fetches(&ChapterId::from("c2")).await, 1);
/// # Ok(())
/// # }
/// ```
pub struct MockSource {
    name: String,
    book: BookInfo,
    chapters: Vec<Chapter>,
    contents: RwLock<HashMap<ChapterId, Arc<str>>>,
    ledger: RwLock<Ledger>,
    book_info_available: bool,
    latency: Option<Duration>,
}

impl MockSource {
    /// Create a mock source for one book, chapters in the given order.
    pub fn with_chapters(
        book: impl Into<BookId>,
        chapters: impl IntoIterator<Item = (impl Into<ChapterId>, impl Into<String>)>,
    ) -> Self {
        let book = book.into();
        let mut list = Vec::new();
        let mut contents = HashMap::new();
        for (ordinal, (id, content)) in chapters.into_iter().enumerate() {
            let id = id.into();
            let ordinal = u32::try_from(ordinal).unwrap_or(u32::MAX);
            list.push(Chapter::new(id.clone(), format!("Chapter {}", ordinal + 1), ordinal));
            contents.insert(id, Arc::from(content.into()));
        }
        Self {
            name: "mock".to_string(),
            book: BookInfo::new(book.clone(), format!("Book {book}")),
            chapters: list,
            contents: RwLock::new(contents),
            ledger: RwLock::new(Ledger::default()),
            book_info_available: true,
            latency: None,
        }
    }

    /// Change the name of the mock source.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_book_info(mut self, book: BookInfo) -> Self {
        self.book = book;
        self
    }

    /// Make [`book_info()`](ContentSource::book_info) fail with `NotFound`.
    pub fn without_book_info(mut self) -> Self {
        self.book_info_available = false;
        self
    }

    /// Delay every call by `latency` (uses the tokio clock).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `times` content fetches of `chapter` with `kind`.
    pub async fn fail_next(&self, chapter: &ChapterId, times: usize, kind: ErrorKind) {
        self.ledger.write().await.failures.insert(chapter.clone(), (times, kind));
    }

    pub async fn set_content(&self, chapter: &ChapterId, content: impl Into<String>) {
        self.contents.write().await.insert(chapter.clone(), Arc::from(content.into()));
    }

    /// Number of content fetches (successful or not) for `chapter`.
    pub async fn content_fetches(&self, chapter: &ChapterId) -> usize {
        self.ledger.read().await.fetches.get(chapter).copied().unwrap_or(0)
    }

    /// Number of content fetches across all chapters.
    pub async fn total_content_fetches(&self) -> usize {
        self.ledger.read().await.fetches.values().sum()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ContentSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chapter_list(&self, book: &BookId) -> Result<Vec<Chapter>> {
        self.simulate_latency().await;
        if *book != self.book.book_id {
            exn::bail!(ErrorKind::NotFound(book.to_string()));
        }
        Ok(self.chapters.clone())
    }

    async fn chapter_content(&self, chapter: &ChapterId) -> Result<ChapterContent> {
        {
            let mut ledger = self.ledger.write().await;
            *ledger.fetches.entry(chapter.clone()).or_default() += 1;
            if let Some((remaining, kind)) = ledger.failures.get_mut(chapter)
                && *remaining > 0
            {
                *remaining -= 1;
                let kind = kind.clone();
                drop(ledger);
                self.simulate_latency().await;
                exn::bail!(kind);
            }
        }
        self.simulate_latency().await;
        let content = self.contents.read().await.get(chapter).cloned();
        let entry = self.chapters.iter().find(|c| c.id == *chapter).cloned();
        match (entry, content) {
            (Some(entry), Some(content)) => Ok(ChapterContent::new(entry, content)),
            _ => exn::bail!(ErrorKind::NotFound(chapter.to_string())),
        }
    }

    async fn book_info(&self, book: &BookId) -> Result<BookInfo> {
        self.simulate_latency().await;
        if !self.book_info_available || *book != self.book.book_id {
            exn::bail!(ErrorKind::NotFound(book.to_string()));
        }
        Ok(self.book.clone())
    }
}
