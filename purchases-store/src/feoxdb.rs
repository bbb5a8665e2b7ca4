//! Durable store backed by FeOxDB.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bincode::{
    config::standard as bincode_config,
    serde::{decode_from_slice, encode_to_vec},
};
use bytes::Bytes;
use feoxdb::{FeoxError, FeoxStore};
use purchases_core::StoreLabel;
use tracing::debug;

use crate::metrics::{self, StoreOp};
use crate::{DeleteStatus, FeOxDbError, Store, StoreError, StoreKey, StoreResult};

const INDEX_PREFIX: &[u8] = b"\x01index\x00";

/// Disk-based store using FeOxDB.
///
/// FeOxDB has no prefix scan, so each domain keeps an index of its keys
/// under a reserved entry. Index updates and the value writes they track
/// happen under one lock, which keeps the index exact.
///
/// ```no_run
/// use purchases_store::FeOxDbStore;
///
/// let store = FeOxDbStore::builder()
///     .path("/var/lib/myapp/purchases")
///     .max_memory(16 * 1024 * 1024)
///     .build()?;
/// # Ok::<(), purchases_store::FeOxDbError>(())
/// ```
///
/// Cloning is cheap, clones share the same database.
#[derive(Clone)]
pub struct FeOxDbStore {
    store: Arc<FeoxStore>,
    index_lock: Arc<Mutex<()>>,
    label: StoreLabel,
}

impl std::fmt::Debug for FeOxDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeOxDbStore")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl FeOxDbStore {
    /// Starts building a new store.
    pub fn builder() -> FeOxDbStoreBuilder {
        FeOxDbStoreBuilder::default()
    }

    /// Memory-only store, handy in tests.
    pub fn in_memory() -> Result<Self, FeOxDbError> {
        Self::builder().build()
    }

    /// Forces pending writes to disk.
    ///
    /// No-op in memory-only mode.
    pub fn flush(&self) {
        self.store.flush();
    }

    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&FeoxStore) -> Result<T, FeOxDbError> + Send + 'static,
    {
        let store = self.store.clone();
        let lock = self.index_lock.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            op(&store)
        })
        .await?
        .map_err(StoreError::from)
    }
}

fn index_key(domain: &str) -> Vec<u8> {
    let mut key = INDEX_PREFIX.to_vec();
    key.extend_from_slice(domain.as_bytes());
    key
}

fn read_index(store: &FeoxStore, domain: &str) -> Result<BTreeSet<String>, FeOxDbError> {
    match store.get(&index_key(domain)) {
        Ok(encoded) => {
            let (keys, _): (BTreeSet<String>, _) = decode_from_slice(&encoded, bincode_config())?;
            Ok(keys)
        }
        Err(FeoxError::KeyNotFound) => Ok(BTreeSet::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_index(
    store: &FeoxStore,
    domain: &str,
    keys: &BTreeSet<String>,
) -> Result<(), FeOxDbError> {
    if keys.is_empty() {
        match store.delete(&index_key(domain)) {
            Ok(_) | Err(FeoxError::KeyNotFound) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
    let encoded = encode_to_vec(keys, bincode_config())?;
    store.insert(&index_key(domain), &encoded)?;
    Ok(())
}

/// Builder for [`FeOxDbStore`].
pub struct FeOxDbStoreBuilder {
    path: Option<PathBuf>,
    max_file_size: Option<u64>,
    max_memory: Option<usize>,
    label: StoreLabel,
}

impl Default for FeOxDbStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            max_file_size: None,
            max_memory: None,
            label: StoreLabel::new_static("feoxdb"),
        }
    }
}

impl FeOxDbStoreBuilder {
    /// Enables persistent storage at the given path.
    ///
    /// If path is a directory, creates `purchases.db` inside it.
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Pre-allocated size of the database file.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// Limits RAM usage.
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    /// Identifies this store in logs and metrics.
    pub fn label(mut self, label: impl Into<StoreLabel>) -> Self {
        self.label = label.into();
        self
    }

    /// Opens the store.
    ///
    /// Fails if the database file can't be opened or created.
    pub fn build(self) -> Result<FeOxDbStore, FeOxDbError> {
        let mut builder = FeoxStore::builder();

        if let Some(mut path) = self.path {
            if path.is_dir() {
                path.push("purchases.db");
            }
            builder = builder.device_path(path.to_string_lossy().to_string());
        }

        if let Some(file_size) = self.max_file_size {
            builder = builder.file_size(file_size);
        }

        if let Some(memory) = self.max_memory {
            builder = builder.max_memory(memory);
        }

        Ok(FeOxDbStore {
            store: Arc::new(builder.build()?),
            index_lock: Arc::new(Mutex::new(())),
            label: self.label,
        })
    }
}

#[async_trait]
impl Store for FeOxDbStore {
    async fn read(&self, key: &StoreKey) -> StoreResult<Option<Bytes>> {
        metrics::record(StoreOp::Read, &self.label);
        let key_bytes = key.to_bytes();
        let store = self.store.clone();

        tokio::task::spawn_blocking(move || match store.get(&key_bytes) {
            Ok(value) => Ok(Some(Bytes::from(value))),
            Err(FeoxError::KeyNotFound) => Ok(None),
            Err(e) => Err(StoreError::from(FeOxDbError::from(e))),
        })
        .await?
    }

    async fn write(&self, key: &StoreKey, value: Bytes) -> StoreResult<()> {
        metrics::record(StoreOp::Write, &self.label);
        let key = key.clone();

        self.blocking(move |store| {
            store.insert(&key.to_bytes(), &value)?;
            let mut index = read_index(store, key.domain())?;
            if index.insert(key.key().to_owned()) {
                write_index(store, key.domain(), &index)?;
            }
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &StoreKey) -> StoreResult<DeleteStatus> {
        metrics::record(StoreOp::Remove, &self.label);
        let key = key.clone();

        self.blocking(move |store| {
            let key_bytes = key.to_bytes();
            if !store.contains_key(&key_bytes) {
                return Ok(DeleteStatus::Missing);
            }
            store.delete(&key_bytes)?;
            let mut index = read_index(store, key.domain())?;
            if index.remove(key.key()) {
                write_index(store, key.domain(), &index)?;
            }
            Ok(DeleteStatus::Deleted(1))
        })
        .await
    }

    async fn remove_all(&self, domain: &str) -> StoreResult<DeleteStatus> {
        metrics::record(StoreOp::Remove, &self.label);
        let domain = domain.to_owned();
        let label = self.label.clone();

        self.blocking(move |store| {
            let index = read_index(store, &domain)?;
            let mut removed = 0;
            for key in &index {
                match store.delete(&StoreKey::new(domain.as_str(), key.as_str()).to_bytes()) {
                    Ok(_) => removed += 1,
                    Err(FeoxError::KeyNotFound) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            write_index(store, &domain, &BTreeSet::new())?;
            debug!(store = %label, domain = %domain, removed, "Domain cleared");
            Ok(DeleteStatus::from_count(removed))
        })
        .await
    }

    fn label(&self) -> StoreLabel {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read() {
        let store = FeOxDbStore::in_memory().unwrap();
        let key = StoreKey::new("customer_info", "cesar");

        store.write(&key, Bytes::from_static(b"{}")).await.unwrap();

        assert_eq!(store.read(&key).await.unwrap(), Some(Bytes::from_static(b"{}")));
    }

    #[tokio::test]
    async fn test_read_missing() {
        let store = FeOxDbStore::in_memory().unwrap();
        let key = StoreKey::new("customer_info", "nobody");

        assert_eq!(store.read(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = FeOxDbStore::in_memory().unwrap();
        let key = StoreKey::new("etags", "u");

        store.write(&key, Bytes::from_static(b"x")).await.unwrap();

        assert_eq!(store.remove(&key).await.unwrap(), DeleteStatus::Deleted(1));
        assert_eq!(store.remove(&key).await.unwrap(), DeleteStatus::Missing);
        assert_eq!(store.read(&key).await.unwrap(), None);
    }

    /// Overwriting a key does not count it twice when the domain is cleared.
    #[tokio::test]
    async fn test_remove_all_counts_unique_keys() {
        let store = FeOxDbStore::in_memory().unwrap();
        let key = StoreKey::new("etags", "u");
        let other = StoreKey::new("etags", "v");
        let kept = StoreKey::new("customer_info", "u");

        store.write(&key, Bytes::from_static(b"1")).await.unwrap();
        store.write(&key, Bytes::from_static(b"2")).await.unwrap();
        store.write(&other, Bytes::from_static(b"3")).await.unwrap();
        store.write(&kept, Bytes::from_static(b"4")).await.unwrap();

        assert_eq!(store.remove_all("etags").await.unwrap(), DeleteStatus::Deleted(2));
        assert_eq!(store.read(&key).await.unwrap(), None);
        assert_eq!(store.read(&other).await.unwrap(), None);
        assert_eq!(store.read(&kept).await.unwrap(), Some(Bytes::from_static(b"4")));
        assert_eq!(store.remove_all("etags").await.unwrap(), DeleteStatus::Missing);
    }

    #[tokio::test]
    async fn test_flush_persists_data() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("purchases.db");
        let key = StoreKey::new("etags", "https://example.com/v1/subscribers/a");

        {
            let store = FeOxDbStore::builder().path(temp_dir.path()).build().unwrap();
            store.write(&key, Bytes::from_static(b"cached")).await.unwrap();
            store.flush();
        }

        let store = FeOxDbStore::builder().path(&db_path).build().unwrap();
        assert_eq!(store.read(&key).await.unwrap(), Some(Bytes::from_static(b"cached")));
        assert_eq!(store.remove_all("etags").await.unwrap(), DeleteStatus::Deleted(1));
    }
}
