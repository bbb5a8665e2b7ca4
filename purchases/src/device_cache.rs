//! Persisted customer info snapshots and their fetch timestamps.
//!
//! Store failures are logged and reported as a cache miss; a broken cache
//! only costs a network fetch.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use purchases_store::{Store, StoreKey};
use tracing::{debug, warn};

use crate::config::FreshnessPolicy;

/// Store domain of serialized snapshots, keyed by app user id.
pub const CUSTOMER_INFO_DOMAIN: &str = "customer_info";

/// Store domain of last fetch timestamps, keyed by app user id.
pub const CUSTOMER_INFO_TIMESTAMP_DOMAIN: &str = "customer_info_last_updated";

/// Customer info storage on top of a [`Store`].
#[derive(Clone)]
pub struct DeviceCache {
    store: Arc<dyn Store>,
    freshness: FreshnessPolicy,
}

impl std::fmt::Debug for DeviceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCache")
            .field("store", &self.store.label())
            .field("freshness", &self.freshness)
            .finish()
    }
}

impl DeviceCache {
    /// Creates a cache judging staleness with `freshness`.
    pub fn new(store: Arc<dyn Store>, freshness: FreshnessPolicy) -> Self {
        Self { store, freshness }
    }

    /// The serialized snapshot of `app_user_id`.
    pub async fn cached_customer_info(&self, app_user_id: &str) -> Option<Bytes> {
        self.read(&snapshot_key(app_user_id)).await
    }

    /// Stores a serialized snapshot.
    ///
    /// Returns whether the write succeeded.
    pub async fn write_customer_info(&self, data: Bytes, app_user_id: &str) -> bool {
        match self.store.write(&snapshot_key(app_user_id), data).await {
            Ok(()) => true,
            Err(error) => {
                warn!(app_user_id, %error, "Failed to store customer info");
                false
            }
        }
    }

    /// When the snapshot of `app_user_id` was last fetched.
    pub async fn customer_info_timestamp(&self, app_user_id: &str) -> Option<DateTime<Utc>> {
        let bytes = self.read(&timestamp_key(app_user_id)).await?;
        let text = std::str::from_utf8(&bytes).ok()?;
        match DateTime::parse_from_rfc3339(text) {
            Ok(timestamp) => Some(timestamp.with_timezone(&Utc)),
            Err(error) => {
                warn!(app_user_id, %error, "Discarding unreadable customer info timestamp");
                None
            }
        }
    }

    /// Records a fetch of `app_user_id` at `at`.
    pub async fn set_customer_info_timestamp(&self, app_user_id: &str, at: DateTime<Utc>) {
        let value = Bytes::from(at.to_rfc3339());
        if let Err(error) = self.store.write(&timestamp_key(app_user_id), value).await {
            warn!(app_user_id, %error, "Failed to store customer info timestamp");
        }
    }

    /// Records a fetch of `app_user_id` now.
    pub async fn set_customer_info_timestamp_to_now(&self, app_user_id: &str) {
        self.set_customer_info_timestamp(app_user_id, Utc::now()).await;
    }

    /// Forgets when `app_user_id` was last fetched, making its snapshot stale.
    pub async fn clear_customer_info_timestamp(&self, app_user_id: &str) {
        self.remove(&timestamp_key(app_user_id)).await;
    }

    /// Whether the snapshot of `app_user_id` needs a refresh.
    ///
    /// A snapshot without a timestamp is always stale.
    pub async fn is_customer_info_stale(&self, app_user_id: &str, is_app_backgrounded: bool) -> bool {
        let Some(timestamp) = self.customer_info_timestamp(app_user_id).await else {
            return true;
        };
        let window = self.freshness.window(is_app_backgrounded);
        // A timestamp in the future (clock change) counts as fresh.
        let stale = (Utc::now() - timestamp)
            .to_std()
            .is_ok_and(|elapsed| elapsed >= window);
        debug!(app_user_id, %timestamp, is_app_backgrounded, stale, "Checked customer info freshness");
        stale
    }

    /// Removes the snapshot and the timestamp of `app_user_id`.
    pub async fn clear_customer_info(&self, app_user_id: &str) {
        self.remove(&snapshot_key(app_user_id)).await;
        self.remove(&timestamp_key(app_user_id)).await;
    }

    async fn read(&self, key: &StoreKey) -> Option<Bytes> {
        match self.store.read(key).await {
            Ok(value) => value,
            Err(error) => {
                warn!(%key, %error, "Failed to read device cache");
                None
            }
        }
    }

    async fn remove(&self, key: &StoreKey) {
        if let Err(error) = self.store.remove(key).await {
            warn!(%key, %error, "Failed to remove from device cache");
        }
    }
}

fn snapshot_key(app_user_id: &str) -> StoreKey {
    StoreKey::new(CUSTOMER_INFO_DOMAIN, app_user_id)
}

fn timestamp_key(app_user_id: &str) -> StoreKey {
    StoreKey::new(CUSTOMER_INFO_TIMESTAMP_DOMAIN, app_user_id)
}
