//! The customer info cache manager.
//!
//! [`InfoCacheManager`] owns the cached customer info of every app user id
//! and decides when to go to the network:
//!
//! | Cache state | [`fetch_if_stale`] | [`customer_info`] |
//! |-------------|--------------------|-------------------|
//! | no snapshot | fetch | fetch |
//! | stale | fetch | cached, refresh in background |
//! | fresh | cached | cached |
//!
//! Concurrent fetches for one app user id share a single request through
//! the [`Backend`]'s coalescing.
//!
//! Listeners (a delegate and any number of change monitors) are told about
//! each snapshot that differs from the last one they were told about.
//!
//! [`fetch_if_stale`]: InfoCacheManager::fetch_if_stale
//! [`customer_info`]: InfoCacheManager::customer_info

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bytes::Bytes;
use purchases_core::{AppUserId, CURRENT_SCHEMA_VERSION, CustomerInfo, JsonObject};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::config::ClientConfig;
use crate::device_cache::DeviceCache;
use crate::dispatch::TaskDispatcher;
use crate::error::{PurchasesError, PurchasesResult};
use crate::metrics;

/// Receives customer info updates.
pub trait CustomerInfoDelegate: Send + Sync {
    /// Called with each snapshot that differs from the previous one delivered.
    fn on_customer_info_updated(&self, customer_info: &CustomerInfo);
}

impl<F> CustomerInfoDelegate for F
where
    F: Fn(&CustomerInfo) + Send + Sync,
{
    fn on_customer_info_updated(&self, customer_info: &CustomerInfo) {
        self(customer_info)
    }
}

#[derive(Default)]
struct Listeners {
    delegate: Option<Arc<dyn CustomerInfoDelegate>>,
    monitors: BTreeMap<u64, Arc<dyn CustomerInfoDelegate>>,
    next_monitor_id: u64,
    last_sent: Option<CustomerInfo>,
}

impl Listeners {
    fn is_empty(&self) -> bool {
        self.delegate.is_none() && self.monitors.is_empty()
    }
}

type SharedListeners = Arc<Mutex<Listeners>>;

fn lock(listeners: &Mutex<Listeners>) -> MutexGuard<'_, Listeners> {
    listeners.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Subscription returned by [`InfoCacheManager::monitor_changes`].
///
/// The monitor is removed when this handle is dropped.
#[must_use = "the monitor is removed when the handle is dropped"]
pub struct ChangeMonitor {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl std::fmt::Debug for ChangeMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeMonitor").field("id", &self.id).finish()
    }
}

impl Drop for ChangeMonitor {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).monitors.remove(&self.id);
        }
    }
}

struct ManagerInner {
    backend: Arc<Backend>,
    device_cache: DeviceCache,
    background_jitter: Duration,
    listeners: SharedListeners,
    dispatcher: TaskDispatcher,
}

/// Caches customer info per app user id and keeps listeners up to date.
///
/// Dropping the manager cancels fetches it started in the background.
pub struct InfoCacheManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for InfoCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfoCacheManager")
            .field("device_cache", &self.inner.device_cache)
            .field("background_jitter", &self.inner.background_jitter)
            .finish_non_exhaustive()
    }
}

impl InfoCacheManager {
    /// Creates a manager fetching through `backend`.
    pub fn new(backend: Arc<Backend>, device_cache: DeviceCache, config: &ClientConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                backend,
                device_cache,
                background_jitter: config.background_jitter,
                listeners: SharedListeners::default(),
                dispatcher: TaskDispatcher::new("customer_info"),
            }),
        }
    }

    /// Fetches customer info from the network and caches it.
    ///
    /// When the app is backgrounded the request starts after a random delay
    /// of up to the configured jitter. On failure the cached snapshot is kept
    /// but marked stale.
    pub async fn fetch(
        &self,
        app_user_id: &str,
        is_app_backgrounded: bool,
    ) -> PurchasesResult<CustomerInfo> {
        let app_user_id = AppUserId::parse(app_user_id)?;
        self.inner.fetch(app_user_id, is_app_backgrounded).await
    }

    /// Returns the cached snapshot if it is fresh, fetches otherwise.
    pub async fn fetch_if_stale(
        &self,
        app_user_id: &str,
        is_app_backgrounded: bool,
    ) -> PurchasesResult<CustomerInfo> {
        let app_user_id = AppUserId::parse(app_user_id)?;
        self.inner
            .fetch_if_stale(app_user_id, is_app_backgrounded)
            .await
    }

    /// Returns the cached snapshot right away when there is one, refreshing
    /// it in the background if stale. Without a snapshot, fetches.
    pub async fn customer_info(
        &self,
        app_user_id: &str,
        is_app_backgrounded: bool,
    ) -> PurchasesResult<CustomerInfo> {
        let app_user_id = AppUserId::parse(app_user_id)?;
        let Some(cached) = self.inner.cached_customer_info(&app_user_id).await else {
            return self.inner.fetch(app_user_id, is_app_backgrounded).await;
        };

        let inner = self.inner.clone();
        self.inner.dispatcher.spawn("customer_info_refresh", async move {
            if let Err(error) = inner.fetch_if_stale(app_user_id, is_app_backgrounded).await {
                debug!(%error, "Background customer info refresh failed");
            }
        });
        Ok(cached)
    }

    /// The cached snapshot of `app_user_id`.
    ///
    /// `None` when there is none, it can't be parsed, or it was written with
    /// another schema version.
    pub async fn cached_customer_info(&self, app_user_id: &str) -> Option<CustomerInfo> {
        let app_user_id = AppUserId::parse(app_user_id).ok()?;
        self.inner.cached_customer_info(&app_user_id).await
    }

    /// Stores `customer_info` as the snapshot of `app_user_id` and notifies
    /// listeners if it changed. Does not touch the fetch timestamp.
    pub async fn cache(&self, customer_info: &CustomerInfo, app_user_id: &str) {
        match AppUserId::parse(app_user_id) {
            Ok(app_user_id) => self.inner.cache(customer_info, &app_user_id).await,
            Err(error) => warn!(%error, "Not caching customer info"),
        }
    }

    /// Notifies listeners of the cached snapshot, if there is one and it
    /// differs from the last one sent.
    pub async fn send_cached_customer_info_if_available(&self, app_user_id: &str) {
        if let Some(info) = self.cached_customer_info(app_user_id).await {
            self.inner.notify_if_changed(&info);
        }
    }

    /// Removes the snapshot and timestamp of `app_user_id` and forgets the
    /// last snapshot sent to listeners.
    pub async fn clear_cache(&self, app_user_id: &str) {
        let Ok(app_user_id) = AppUserId::parse(app_user_id) else {
            return;
        };
        self.inner
            .device_cache
            .clear_customer_info(app_user_id.as_str())
            .await;
        lock(&self.inner.listeners).last_sent = None;
    }

    /// Sets or removes the delegate.
    pub fn set_delegate(&self, delegate: Option<Arc<dyn CustomerInfoDelegate>>) {
        lock(&self.inner.listeners).delegate = delegate;
    }

    /// Registers `monitor` for change notifications until the handle drops.
    pub fn monitor_changes<M>(&self, monitor: M) -> ChangeMonitor
    where
        M: CustomerInfoDelegate + 'static,
    {
        let mut listeners = lock(&self.inner.listeners);
        let id = listeners.next_monitor_id;
        listeners.next_monitor_id += 1;
        listeners.monitors.insert(id, Arc::new(monitor));
        ChangeMonitor {
            id,
            listeners: Arc::downgrade(&self.inner.listeners),
        }
    }

    /// The last snapshot delivered to listeners.
    pub fn last_sent_customer_info(&self) -> Option<CustomerInfo> {
        lock(&self.inner.listeners).last_sent.clone()
    }
}

impl Drop for InfoCacheManager {
    fn drop(&mut self) {
        self.inner.dispatcher.cancel_all();
    }
}

impl ManagerInner {
    async fn fetch(
        self: &Arc<Self>,
        app_user_id: AppUserId,
        is_app_backgrounded: bool,
    ) -> PurchasesResult<CustomerInfo> {
        // Marks the snapshot fresh while the fetch runs so staleness checks
        // don't start another one.
        self.device_cache
            .set_customer_info_timestamp_to_now(app_user_id.as_str())
            .await;

        let (completion, receiver) = oneshot::channel();
        let inner = self.clone();
        let delay = if is_app_backgrounded {
            self.background_jitter
        } else {
            Duration::ZERO
        };
        self.dispatcher
            .spawn_with_random_delay("customer_info_fetch", delay, async move {
                let result = inner.fetch_now(&app_user_id).await;
                let _ = completion.send(result);
            });

        receiver.await.unwrap_or(Err(PurchasesError::Cancelled))
    }

    async fn fetch_now(&self, app_user_id: &AppUserId) -> PurchasesResult<CustomerInfo> {
        metrics::customer_info_fetch();
        match self.backend.get_customer_info(app_user_id.as_str()).await {
            Ok(info) => {
                self.cache(&info, app_user_id).await;
                self.device_cache
                    .set_customer_info_timestamp_to_now(app_user_id.as_str())
                    .await;
                Ok(info)
            }
            Err(error) => {
                warn!(%app_user_id, %error, "Customer info fetch failed");
                metrics::customer_info_fetch_failed();
                self.device_cache
                    .clear_customer_info_timestamp(app_user_id.as_str())
                    .await;
                Err(error)
            }
        }
    }

    async fn fetch_if_stale(
        self: &Arc<Self>,
        app_user_id: AppUserId,
        is_app_backgrounded: bool,
    ) -> PurchasesResult<CustomerInfo> {
        let cached = self.cached_customer_info(&app_user_id).await;
        let stale = self
            .device_cache
            .is_customer_info_stale(app_user_id.as_str(), is_app_backgrounded)
            .await;

        match cached {
            Some(info) if !stale => {
                debug!(%app_user_id, "Customer info cache is fresh");
                Ok(info)
            }
            _ => {
                debug!(%app_user_id, stale, "Customer info cache needs a refresh");
                self.fetch(app_user_id, is_app_backgrounded).await
            }
        }
    }

    async fn cached_customer_info(&self, app_user_id: &AppUserId) -> Option<CustomerInfo> {
        let data = self
            .device_cache
            .cached_customer_info(app_user_id.as_str())
            .await?;
        let json: JsonObject = match serde_json::from_slice(&data) {
            Ok(json) => json,
            Err(error) => {
                warn!(%app_user_id, %error, "Cached customer info is not a JSON object");
                return None;
            }
        };
        let info = match CustomerInfo::from_json(json) {
            Ok(info) => info,
            Err(error) => {
                warn!(%app_user_id, %error, "Cached customer info could not be parsed");
                return None;
            }
        };
        if info.schema_version() != Some(CURRENT_SCHEMA_VERSION) {
            warn!(
                %app_user_id,
                found = ?info.schema_version(),
                expected = CURRENT_SCHEMA_VERSION,
                "Ignoring cached customer info with another schema version"
            );
            return None;
        }
        Some(info)
    }

    async fn cache(&self, customer_info: &CustomerInfo, app_user_id: &AppUserId) {
        let data = match serde_json::to_vec(&customer_info.to_json()) {
            Ok(data) => Bytes::from(data),
            Err(error) => {
                warn!(%app_user_id, %error, "Customer info could not be serialized");
                return;
            }
        };
        if self
            .device_cache
            .write_customer_info(data, app_user_id.as_str())
            .await
        {
            self.notify_if_changed(customer_info);
        }
    }

    fn notify_if_changed(&self, customer_info: &CustomerInfo) {
        let recipients: Vec<Arc<dyn CustomerInfoDelegate>> = {
            let mut listeners = lock(&self.listeners);
            if listeners.is_empty() || listeners.last_sent.as_ref() == Some(customer_info) {
                return;
            }
            listeners.last_sent = Some(customer_info.clone());
            listeners
                .delegate
                .iter()
                .chain(listeners.monitors.values())
                .cloned()
                .collect()
        };

        debug!(recipients = recipients.len(), "Sending customer info update");
        for recipient in recipients {
            recipient.on_customer_info_updated(customer_info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use purchases_store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> InfoCacheManager {
        let config = ClientConfig::builder("key")
            .base_url("http://127.0.0.1:9")
            .build();
        let store: Arc<dyn purchases_store::Store> = Arc::new(MemoryStore::builder(100).build());
        let backend = Backend::new(&config, store.clone()).unwrap();
        InfoCacheManager::new(
            Arc::new(backend),
            DeviceCache::new(store, config.freshness),
            &config,
        )
    }

    fn info(entitlements: serde_json::Value) -> CustomerInfo {
        let value = serde_json::json!({
            "request_date": "2019-08-16T10:30:42Z",
            "subscriber": {
                "first_seen": "2019-07-17T00:05:54Z",
                "original_app_user_id": "cesar",
                "entitlements": entitlements
            }
        });
        match value {
            serde_json::Value::Object(map) => CustomerInfo::from_json(map).unwrap(),
            _ => unreachable!(),
        }
    }

    /// Monitors are notified once per distinct snapshot and stop after drop.
    #[tokio::test]
    async fn test_monitor_lifecycle() {
        let manager = manager();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let monitor = manager.monitor_changes(move |_: &CustomerInfo| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.cache(&info(serde_json::json!({})), "cesar").await;
        manager.cache(&info(serde_json::json!({})), "cesar").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        drop(monitor);
        manager.cache(&info(serde_json::json!({"pro": {}})), "cesar").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Without listeners nothing is recorded as sent.
    #[tokio::test]
    async fn test_no_listeners_no_last_sent() {
        let manager = manager();
        manager.cache(&info(serde_json::json!({})), "cesar").await;
        assert!(manager.last_sent_customer_info().is_none());
        assert!(manager.cached_customer_info("cesar").await.is_some());
    }

    #[tokio::test]
    async fn test_clear_cache_resets_last_sent() {
        let manager = manager();
        let _monitor = manager.monitor_changes(|_: &CustomerInfo| {});
        manager.cache(&info(serde_json::json!({})), "cesar").await;
        assert!(manager.last_sent_customer_info().is_some());

        manager.clear_cache("cesar").await;

        assert!(manager.last_sent_customer_info().is_none());
        assert!(manager.cached_customer_info("cesar").await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_app_user_id() {
        let manager = manager();
        assert!(matches!(
            manager.fetch("  ", false).await,
            Err(PurchasesError::MissingAppUserId(_))
        ));
        assert!(manager.cached_customer_info("").await.is_none());
    }
}
