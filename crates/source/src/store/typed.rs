use crate::StoreHandle;
use crate::error::{ErrorKind, Result};
use crate::models::ProgressRecord;
use exn::ResultExt;
use pageturn_layout::models::{BookId, LayoutKey, PageCountCacheData, ReaderSettings};
use serde::Serialize;
use serde::de::DeserializeOwned;

const SETTINGS_KEY: &str = "reader/settings";

fn progress_key(book: &BookId) -> String {
    format!("progress/{book}")
}

fn page_counts_key(book: &BookId, font_size: u16, container_key: &str) -> String {
    format!("page_counts/{book}/{font_size}/{container_key}")
}

async fn load_json<T: DeserializeOwned>(store: &StoreHandle, key: &str) -> Result<Option<T>> {
    let Some(bytes) = store.get(key).await? else {
        return Ok(None);
    };
    let value = serde_json::from_slice(&bytes).or_raise(|| ErrorKind::InvalidData(key.to_string()))?;
    Ok(Some(value))
}

async fn save_json<T: Serialize>(store: &StoreHandle, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value).or_raise(|| ErrorKind::InvalidData(key.to_string()))?;
    store.set(key, &bytes).await
}

/// Reading positions and whole-book page-count indexes, one per book.
#[derive(Clone)]
pub struct ProgressStore {
    store: StoreHandle,
}
impl ProgressStore {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    pub async fn save_progress(&self, record: &ProgressRecord) -> Result<()> {
        save_json(&self.store, &progress_key(&record.book_id), record).await
    }

    pub async fn load_progress(&self, book: &BookId) -> Result<Option<ProgressRecord>> {
        load_json(&self.store, &progress_key(book)).await
    }

    pub async fn clear_progress(&self, book: &BookId) -> Result<bool> {
        self.store.remove(&progress_key(book)).await
    }

    pub async fn save_page_counts(&self, index: &PageCountCacheData) -> Result<()> {
        let key = page_counts_key(&index.book_id, index.font_size, &index.container_key);
        save_json(&self.store, &key, index).await
    }

    /// Page-count index for the exact `(book, font size, container)` key.
    ///
    /// A stored index that does not match the requested key is treated as
    /// absent.
    pub async fn load_page_counts(&self, book: &BookId, layout: &LayoutKey) -> Result<Option<PageCountCacheData>> {
        let key = page_counts_key(book, layout.font_size, &layout.container.key());
        let index: Option<PageCountCacheData> = load_json(&self.store, &key).await?;
        Ok(index.filter(|index| index.is_valid_for(book, layout)))
    }
}

/// Reader display settings, shared across books.
#[derive(Clone)]
pub struct SettingsStore {
    store: StoreHandle,
}
impl SettingsStore {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Stored settings, or the defaults when nothing has been saved yet.
    pub async fn load(&self) -> Result<ReaderSettings> {
        Ok(load_json(&self.store, SETTINGS_KEY).await?.unwrap_or_default())
    }

    pub async fn save(&self, settings: &ReaderSettings) -> Result<()> {
        save_json(&self.store, SETTINGS_KEY, settings).await
    }
}
