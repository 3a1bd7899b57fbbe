//! Bounded in-memory chapter cache.
//!
//! The cache is the only component that talks to the content source on the
//! reader's behalf. It keeps chapter text and split pages for a small number
//! of chapters around the reading position, so that flipping into a
//! neighbouring chapter never waits on the network.
//!
//! # Coalescing
//! Every chapter has at most one request in flight. A foreground
//! [`load()`](ChapterCache::load) waits for it; a background
//! [`preload()`](ChapterCache::preload) reports
//! [`Preloaded::InFlight`] and returns immediately.

mod cache;
pub mod error;
mod models;

pub use crate::cache::{ChapterCache, DEFAULT_CAPACITY};
pub use crate::models::{CachedChapter, ChapterTarget, Preloaded};
