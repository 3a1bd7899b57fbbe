//! Timeout and bounded-retry decorator for content sources.

use crate::content::ContentSource;
use crate::error::{ErrorKind, Result};
use crate::models::ChapterContent;
use crate::SourceHandle;
use async_trait::async_trait;
use exn::ResultExt;
use pageturn_layout::models::{BookId, BookInfo, Chapter, ChapterId};
use std::future::Future;
use std::time::Duration;

/// How hard to try before giving up on a single source operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure (only for retryable errors).
    pub retries: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Upper bound for a single attempt.
    pub timeout: Duration,
}
impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            delay: Duration::from_millis(200),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Content source wrapper adding a per-attempt timeout and bounded retries.
///
/// A timed-out attempt becomes [`Unavailable`](ErrorKind::Unavailable) instead
/// of hanging. Only [retryable](ErrorKind::is_retryable) errors are retried;
/// `NotFound` and friends are returned straight away.
#[derive(Clone)]
pub struct ResilientSource {
    inner: SourceHandle,
    policy: RetryPolicy,
}
impl ResilientSource {
    pub fn new(inner: SourceHandle, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn attempt<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout_ms = u64::try_from(self.policy.timeout.as_millis()).unwrap_or(u64::MAX);
        let mut attempt = 0;
        loop {
            let outcome = tokio::time::timeout(self.policy.timeout, f())
                .await
                .or_raise(|| ErrorKind::Unavailable(timeout_ms))
                .and_then(|result| result);
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.policy.retries => {
                    attempt += 1;
                    tracing::debug!(source = self.inner.name(), operation, attempt, error = ?e, "Retrying source operation");
                    tokio::time::sleep(self.policy.delay).await;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl ContentSource for ResilientSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn chapter_list(&self, book: &BookId) -> Result<Vec<Chapter>> {
        self.attempt("chapter_list", || self.inner.chapter_list(book)).await
    }

    async fn chapter_content(&self, chapter: &ChapterId) -> Result<ChapterContent> {
        self.attempt("chapter_content", || self.inner.chapter_content(chapter)).await
    }

    async fn book_info(&self, book: &BookId) -> Result<BookInfo> {
        self.attempt("book_info", || self.inner.book_info(book)).await
    }
}
