use super::{BookId, ChapterId};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// A single chapter entry from a book's chapter list.
///
/// Chapters are fetched once per book and never reordered; every index used
/// by the engine is an index into that list, so list order must equal reading
/// order (ascending `ordinal`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Chapter {
    pub id: ChapterId,
    pub display_name: String,
    pub ordinal: u32,
}
impl Chapter {
    pub fn new(id: impl Into<ChapterId>, display_name: impl Into<String>, ordinal: u32) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            ordinal,
        }
    }
}
impl Display for Chapter {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "#{} {}", self.ordinal, self.display_name)
    }
}

/// Book-level metadata, shown on the book detail pseudo-page in front of the
/// first chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BookInfo {
    pub book_id: BookId,
    pub title: String,
    pub author: Option<String>,
    pub intro: Option<String>,
    pub cover_url: Option<String>,
}
impl BookInfo {
    pub fn new(book_id: impl Into<BookId>, title: impl Into<String>) -> Self {
        Self {
            book_id: book_id.into(),
            title: title.into(),
            author: None,
            intro: None,
            cover_url: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_intro(mut self, intro: impl Into<String>) -> Self {
        self.intro = Some(intro.into());
        self
    }
}

/// Sort a freshly fetched chapter list into reading order.
///
/// Sources are expected to return chapters already ordered, but the sort is
/// stable so an already-ordered list is returned untouched.
pub fn into_reading_order(mut chapters: Vec<Chapter>) -> Vec<Chapter> {
    chapters.sort_by_key(|c| c.ordinal);
    chapters
}
