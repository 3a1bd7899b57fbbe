//! Source models.
//!
//! Payloads returned by content sources and records written to the
//! persistence collaborators.

use pageturn_layout::models::{BookId, Chapter, ChapterId, FlipEffect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;

/// The text of a single chapter, as returned by a content source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterContent {
    pub chapter: Chapter,
    /// Raw chapter text. Shared, since the same text is split again on every
    /// layout change.
    pub content: Arc<str>,
}
impl ChapterContent {
    pub fn new(chapter: Chapter, content: impl Into<Arc<str>>) -> Self {
        Self { chapter, content: content.into() }
    }
}

/// A persisted reading position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub book_id: BookId,
    pub chapter_id: ChapterId,
    pub chapter_index: usize,
    /// Page within the chapter; `-1` is the book detail page.
    pub page_index: i64,
    /// Whole-book progress, `0.0..=1.0`.
    pub progress: f32,
    pub flip_effect: FlipEffect,
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
}
