//! Reader data model and deterministic pagination.
//!
//! Everything in this crate is pure: no IO, no async. The chapter list, page
//! data and whole-book page-count index defined in [`models`] are shared by
//! the rest of the workspace, and [`split()`] turns one chapter's text into
//! screen pages for a given [`Layout`](models::Layout).

mod consts;
pub mod error;
pub mod models;
mod split;

pub use crate::consts::{
    DEFAULT_BACKGROUND_COLOR, DEFAULT_BRIGHTNESS, DEFAULT_FONT_SIZE, DEFAULT_LINE_SPACING, DEFAULT_PADDING_HORIZONTAL,
    DEFAULT_PADDING_VERTICAL, DEFAULT_TEXT_COLOR,
};
pub use crate::split::{PageMetrics, split, split_with};
