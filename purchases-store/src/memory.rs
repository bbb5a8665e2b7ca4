//! In-memory store powered by Moka.

use async_trait::async_trait;
use bytes::Bytes;
use moka::future::Cache;
use purchases_core::StoreLabel;
use tracing::debug;

use crate::metrics::{self, StoreOp};
use crate::{DeleteStatus, Store, StoreKey, StoreResult};

/// In-memory store backed by a Moka async cache.
///
/// Entries never expire on their own; the cache only evicts the least
/// recently used entries once `max_capacity` is reached.
///
/// ```
/// use purchases_store::MemoryStore;
///
/// let store = MemoryStore::builder(10_000).label("etags").build();
/// ```
///
/// # Caveats
///
/// - Data is **not persisted**, use [`FeOxDbStore`](crate::FeOxDbStore) for that
/// - `remove_all` scans every entry, which is fine at the sizes this client stores
#[derive(Clone)]
pub struct MemoryStore {
    cache: Cache<StoreKey, Bytes>,
    label: StoreLabel,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("label", &self.label)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl MemoryStore {
    /// Creates a new builder holding at most `max_capacity` entries.
    pub fn builder(max_capacity: u64) -> MemoryStoreBuilder {
        MemoryStoreBuilder {
            max_capacity,
            label: StoreLabel::new_static("moka"),
        }
    }

    /// Applies pending inserts and evictions.
    ///
    /// Moka processes some bookkeeping lazily; tests call this before
    /// asserting on entry counts.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Approximate number of stored entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

/// Builder for [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryStoreBuilder {
    max_capacity: u64,
    label: StoreLabel,
}

impl MemoryStoreBuilder {
    /// Identifies this store in logs and metrics.
    pub fn label(mut self, label: impl Into<StoreLabel>) -> Self {
        self.label = label.into();
        self
    }

    /// Creates the store.
    pub fn build(self) -> MemoryStore {
        MemoryStore {
            cache: Cache::builder().max_capacity(self.max_capacity).build(),
            label: self.label,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read(&self, key: &StoreKey) -> StoreResult<Option<Bytes>> {
        metrics::record(StoreOp::Read, &self.label);
        Ok(self.cache.get(key).await)
    }

    async fn write(&self, key: &StoreKey, value: Bytes) -> StoreResult<()> {
        metrics::record(StoreOp::Write, &self.label);
        self.cache.insert(key.clone(), value).await;
        Ok(())
    }

    async fn remove(&self, key: &StoreKey) -> StoreResult<DeleteStatus> {
        metrics::record(StoreOp::Remove, &self.label);
        match self.cache.remove(key).await {
            Some(_) => Ok(DeleteStatus::Deleted(1)),
            None => Ok(DeleteStatus::Missing),
        }
    }

    async fn remove_all(&self, domain: &str) -> StoreResult<DeleteStatus> {
        metrics::record(StoreOp::Remove, &self.label);
        let keys: Vec<StoreKey> = self
            .cache
            .iter()
            .filter(|(key, _)| key.domain() == domain)
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in &keys {
            self.cache.invalidate(key).await;
        }
        debug!(store = %self.label, domain, removed = keys.len(), "Domain cleared");
        Ok(DeleteStatus::from_count(keys.len()))
    }

    fn label(&self) -> StoreLabel {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let store = MemoryStore::builder(100).build();
        let key = StoreKey::new("etags", "https://example.com/v1/a");

        store.write(&key, Bytes::from_static(b"payload")).await.unwrap();

        assert_eq!(
            store.read(&key).await.unwrap(),
            Some(Bytes::from_static(b"payload"))
        );
    }

    #[tokio::test]
    async fn test_remove_missing() {
        let store = MemoryStore::builder(100).build();
        let key = StoreKey::new("etags", "absent");

        assert_eq!(store.remove(&key).await.unwrap(), DeleteStatus::Missing);
    }

    /// Clearing a domain leaves other domains alone.
    #[tokio::test]
    async fn test_remove_all_is_scoped_to_domain() {
        let store = MemoryStore::builder(100).build();
        let etag_a = StoreKey::new("etags", "a");
        let etag_b = StoreKey::new("etags", "b");
        let info = StoreKey::new("customer_info", "a");

        store.write(&etag_a, Bytes::from_static(b"1")).await.unwrap();
        store.write(&etag_b, Bytes::from_static(b"2")).await.unwrap();
        store.write(&info, Bytes::from_static(b"3")).await.unwrap();

        assert_eq!(
            store.remove_all("etags").await.unwrap(),
            DeleteStatus::Deleted(2)
        );
        assert_eq!(store.read(&etag_a).await.unwrap(), None);
        assert_eq!(store.read(&etag_b).await.unwrap(), None);
        assert!(store.read(&info).await.unwrap().is_some());
    }
}
