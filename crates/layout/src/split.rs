//! Deterministic chapter-to-page splitting.
//!
//! The splitter works on a character grid rather than real glyph metrics: a
//! cell is half an em, narrow glyphs take one cell and wide (CJK) glyphs take
//! two, as reported by `unicode-width`. That keeps it pure and fast enough to
//! paginate a whole book in the background, and identical inputs always give
//! identical pages.

use crate::consts::CELLS_PER_EM;
use crate::error::{ErrorKind, Result};
use crate::models::Layout;
use tracing::instrument;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Number of text cells per line and lines per page for a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMetrics {
    pub columns: usize,
    pub rows: usize,
}
impl PageMetrics {
    /// Measures the text grid for `layout`.
    ///
    /// Returns [`InvalidContainer`](ErrorKind::InvalidContainer) when the
    /// layout is not ready. Padding that swallows the whole page still leaves
    /// room for one wide glyph on one line, so non-empty content always
    /// produces at least one page.
    pub fn measure(layout: &Layout) -> Result<Self> {
        if !layout.is_ready() || layout.settings.font_size == 0 {
            exn::bail!(ErrorKind::InvalidContainer(layout.container));
        }
        let settings = &layout.settings;
        let em = f32::from(settings.font_size) * layout.density;
        let cell = em / CELLS_PER_EM;
        let line_spacing = if settings.line_spacing.is_finite() && settings.line_spacing > 0.0 {
            settings.line_spacing
        } else {
            1.0
        };
        let line_height = em * line_spacing;
        let width = layout.container.width as f32 - 2.0 * settings.padding_horizontal.max(0.0) * layout.density;
        let height = layout.container.height as f32 - 2.0 * settings.padding_vertical.max(0.0) * layout.density;
        // Float-to-int `as` saturates: negative areas become zero here.
        let columns = ((width / cell).floor() as usize).max(CELLS_PER_EM as usize);
        let rows = ((height / line_height).floor() as usize).max(1);
        Ok(Self { columns, rows })
    }
}

/// Splits chapter text into screen pages for `layout`.
///
/// Paragraphs are separated by line breaks and blank paragraphs collapse.
/// Empty (or whitespace-only) content yields a single empty page.
#[instrument(level = "trace", skip(content, layout), fields(content_size = content.len()))]
pub fn split(content: &str, layout: &Layout) -> Result<Vec<String>> {
    let metrics = PageMetrics::measure(layout)?;
    Ok(split_with(content, metrics))
}

/// Same as [`split()`] with pre-measured metrics.
pub fn split_with(content: &str, metrics: PageMetrics) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in content.lines().map(str::trim).filter(|p| !p.is_empty()) {
        wrap_paragraph(paragraph, metrics.columns, &mut lines);
    }
    if lines.is_empty() {
        return vec![String::new()];
    }
    lines.chunks(metrics.rows.max(1)).map(|page| page.join("\n")).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Space,
    /// A run of narrow glyphs that should stay on one line if possible.
    Word(&'a str),
    /// A single wide glyph; lines may break on either side of it.
    Wide(&'a str),
}

fn tokenize(paragraph: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;
    for (i, ch) in paragraph.char_indices() {
        let is_space = ch.is_whitespace();
        let is_wide = !is_space && ch.width().unwrap_or(0) > 1;
        if (is_space || is_wide)
            && let Some(start) = word_start.take()
        {
            tokens.push(Token::Word(&paragraph[start..i]));
        }
        if is_space {
            if tokens.last() != Some(&Token::Space) {
                tokens.push(Token::Space);
            }
        } else if is_wide {
            tokens.push(Token::Wide(&paragraph[i..i + ch.len_utf8()]));
        } else if word_start.is_none() {
            word_start = Some(i);
        }
    }
    if let Some(start) = word_start {
        tokens.push(Token::Word(&paragraph[start..]));
    }
    tokens
}

struct LineBuilder<'l> {
    lines: &'l mut Vec<String>,
    line: String,
    width: usize,
    columns: usize,
}
impl LineBuilder<'_> {
    fn flush(&mut self) {
        let line = std::mem::take(&mut self.line);
        self.lines.push(line.trim_end().to_string());
        self.width = 0;
    }

    fn push(&mut self, text: &str, width: usize) {
        self.line.push_str(text);
        self.width += width;
    }

    fn fits(&self, width: usize) -> bool {
        self.width + width <= self.columns
    }

    fn push_broken(&mut self, word: &str) {
        for ch in word.chars() {
            let width = ch.width().unwrap_or(0);
            if !self.fits(width) && self.width > 0 {
                self.flush();
            }
            self.line.push(ch);
            self.width += width;
        }
    }
}

fn wrap_paragraph(paragraph: &str, columns: usize, lines: &mut Vec<String>) {
    let mut builder = LineBuilder {
        lines,
        line: String::new(),
        width: 0,
        columns,
    };
    for token in tokenize(paragraph) {
        match token {
            Token::Space => {
                // Never start a line with a space, never wrap just to fit one.
                if builder.width > 0 && builder.fits(1) {
                    builder.push(" ", 1);
                }
            },
            Token::Wide(glyph) => {
                let width = glyph.width();
                if !builder.fits(width) && builder.width > 0 {
                    builder.flush();
                }
                builder.push(glyph, width);
            },
            Token::Word(word) => {
                let width = word.width();
                if builder.fits(width) {
                    builder.push(word, width);
                } else if width <= columns {
                    builder.flush();
                    builder.push(word, width);
                } else {
                    builder.push_broken(word);
                }
            },
        }
    }
    if !builder.line.is_empty() {
        builder.flush();
    }
}
