//! Key-value persistence used for reading progress, page-count indexes and
//! reader settings.
//!
//! The host owns the real storage (shared preferences, a database, a file).
//! The engine only needs byte blobs under string keys; [`ProgressStore`] and
//! [`SettingsStore`] add the typed layer on top with `serde_json`.

mod memory;
mod typed;

pub use self::memory::MemoryStore;
pub use self::typed::{ProgressStore, SettingsStore};
use crate::error::Result;
use async_trait::async_trait;

/// Byte-blob storage under string keys.
///
/// # Examples
///
/// ```
/// use pageturn_source::store::{KeyValueStore, MemoryStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::default();
/// store.set("greeting", b"hello").await.unwrap();
/// assert_eq!(store.get("greeting").await.unwrap().as_deref(), Some(&b"hello"[..]));
/// assert!(store.remove("greeting").await.unwrap());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`, `None` if nothing is stored.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove `key`. Returns whether anything was stored.
    async fn remove(&self, key: &str) -> Result<bool>;
}
