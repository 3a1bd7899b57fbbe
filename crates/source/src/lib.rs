//! Collaborators the reading engine talks to: where chapter text comes from
//! ([`content`]) and where reading progress and settings go ([`store`]).

pub mod content;
pub mod error;
pub mod models;
pub mod store;

pub use crate::content::{ContentSource, ResilientSource, RetryPolicy};
pub use crate::store::{KeyValueStore, MemoryStore, ProgressStore, SettingsStore};
use std::sync::Arc;

pub type SourceHandle = Arc<dyn ContentSource + Send + Sync>;
pub type StoreHandle = Arc<dyn KeyValueStore + Send + Sync>;
