use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use purchases_core::StoreLabel;

use crate::{DeleteStatus, StoreError, StoreKey};

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable key/value collaborator.
///
/// Values are opaque bytes; callers own the encoding. Implementations must
/// be safe to share between tasks.
#[async_trait]
pub trait Store: Sync + Send {
    /// Reads a value, `None` if absent.
    async fn read(&self, key: &StoreKey) -> StoreResult<Option<Bytes>>;

    /// Writes or overwrites a value.
    async fn write(&self, key: &StoreKey, value: Bytes) -> StoreResult<()>;

    /// Removes one value.
    async fn remove(&self, key: &StoreKey) -> StoreResult<DeleteStatus>;

    /// Removes every value in `domain`.
    async fn remove_all(&self, domain: &str) -> StoreResult<DeleteStatus>;

    /// Returns the label of this store for logs and metrics.
    fn label(&self) -> StoreLabel {
        StoreLabel::new_static("store")
    }
}

#[async_trait]
impl Store for &dyn Store {
    async fn read(&self, key: &StoreKey) -> StoreResult<Option<Bytes>> {
        (*self).read(key).await
    }

    async fn write(&self, key: &StoreKey, value: Bytes) -> StoreResult<()> {
        (*self).write(key, value).await
    }

    async fn remove(&self, key: &StoreKey) -> StoreResult<DeleteStatus> {
        (*self).remove(key).await
    }

    async fn remove_all(&self, domain: &str) -> StoreResult<DeleteStatus> {
        (*self).remove_all(domain).await
    }

    fn label(&self) -> StoreLabel {
        (*self).label()
    }
}

#[async_trait]
impl Store for Box<dyn Store> {
    async fn read(&self, key: &StoreKey) -> StoreResult<Option<Bytes>> {
        (**self).read(key).await
    }

    async fn write(&self, key: &StoreKey, value: Bytes) -> StoreResult<()> {
        (**self).write(key, value).await
    }

    async fn remove(&self, key: &StoreKey) -> StoreResult<DeleteStatus> {
        (**self).remove(key).await
    }

    async fn remove_all(&self, domain: &str) -> StoreResult<DeleteStatus> {
        (**self).remove_all(domain).await
    }

    fn label(&self) -> StoreLabel {
        (**self).label()
    }
}

#[async_trait]
impl Store for Arc<dyn Store> {
    async fn read(&self, key: &StoreKey) -> StoreResult<Option<Bytes>> {
        (**self).read(key).await
    }

    async fn write(&self, key: &StoreKey, value: Bytes) -> StoreResult<()> {
        (**self).write(key, value).await
    }

    async fn remove(&self, key: &StoreKey) -> StoreResult<DeleteStatus> {
        (**self).remove(key).await
    }

    async fn remove_all(&self, domain: &str) -> StoreResult<DeleteStatus> {
        (**self).remove_all(domain).await
    }

    fn label(&self) -> StoreLabel {
        (**self).label()
    }
}
