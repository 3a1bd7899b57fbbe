use super::{BookId, ChapterId, LayoutKey};

/// Whole-book page counts for a single layout configuration.
///
/// Built once per `(book_id, font_size, container_key)` and trusted only for
/// that exact key. Never patched: a layout change discards it wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PageCountCacheData {
    pub book_id: BookId,
    pub font_size: u16,
    pub container_key: String,
    pub total_pages: usize,
    /// Page count per chapter, in reading order.
    pub chapter_page_counts: Vec<(ChapterId, usize)>,
}
impl PageCountCacheData {
    pub fn new(book_id: BookId, layout: LayoutKey, chapter_page_counts: Vec<(ChapterId, usize)>) -> Self {
        let total_pages = chapter_page_counts.iter().map(|(_, count)| count).sum();
        Self {
            book_id,
            font_size: layout.font_size,
            container_key: layout.container.key(),
            total_pages,
            chapter_page_counts,
        }
    }

    pub fn is_valid_for(&self, book_id: &BookId, layout: &LayoutKey) -> bool {
        self.book_id == *book_id && self.font_size == layout.font_size && self.container_key == layout.container.key()
    }

    /// Resolves an absolute (whole-book) page to a chapter and a page index
    /// relative to that chapter.
    ///
    /// Walks the ordered counts subtracting each chapter's pages until the
    /// remainder fits inside the next chapter. Empty chapters are skipped.
    /// Returns `None` when `global_page` is past the end of the book.
    pub fn find_chapter_by_absolute_page(&self, global_page: usize) -> Option<(ChapterId, usize)> {
        let mut remainder = global_page;
        for (chapter_id, count) in &self.chapter_page_counts {
            if remainder < *count {
                return Some((chapter_id.clone(), remainder));
            }
            remainder -= count;
        }
        None
    }

    /// Absolute page of `page_index` within `chapter_id`, if the chapter is
    /// part of this index.
    pub fn absolute_page(&self, chapter_id: &ChapterId, page_index: usize) -> Option<usize> {
        let mut offset = 0;
        for (id, count) in &self.chapter_page_counts {
            if id == chapter_id {
                return Some(offset + page_index.min(count.saturating_sub(1)));
            }
            offset += count;
        }
        None
    }

    /// Reading progress, `0.0..=1.0`, after finishing `page_index` of
    /// `chapter_id`.
    pub fn progress_of(&self, chapter_id: &ChapterId, page_index: usize) -> Option<f32> {
        if self.total_pages == 0 {
            return None;
        }
        let absolute = self.absolute_page(chapter_id, page_index)?;
        Some(((absolute + 1) as f32 / self.total_pages as f32).min(1.0))
    }

    pub fn page_count_of(&self, chapter_id: &ChapterId) -> Option<usize> {
        self.chapter_page_counts.iter().find(|(id, _)| id == chapter_id).map(|(_, count)| *count)
    }
}
