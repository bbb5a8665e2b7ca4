//! Integration tests for InfoCacheManager using wiremock.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::{TimeDelta, Utc};
use pretty_assertions::assert_eq;
use purchases::{
    Backend, ClientConfig, CustomerInfo, CustomerInfoDelegate, DeviceCache, FreshnessPolicy,
    InfoCacheManager, MemoryStore, PurchasesError, Store,
};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn customer_info_body(app_user_id: &str, request_date: &str) -> Value {
    json!({
        "request_date": request_date,
        "subscriber": {
            "first_seen": "2019-07-17T00:05:54Z",
            "original_app_user_id": app_user_id,
            "subscriptions": {},
            "entitlements": {}
        }
    })
}

/// A body whose subscriber holds an active "pro" entitlement.
fn entitled_body(app_user_id: &str, request_date: &str) -> Value {
    let mut body = customer_info_body(app_user_id, request_date);
    body["subscriber"]["entitlements"] = json!({
        "pro": {
            "expires_date": null,
            "product_identifier": "lifetime",
            "purchase_date": "2019-08-16T10:30:42Z"
        }
    });
    body
}

fn parse(body: Value) -> CustomerInfo {
    let Value::Object(body) = body else {
        unreachable!()
    };
    CustomerInfo::from_json(body).unwrap()
}

fn customer_info(app_user_id: &str, request_date: &str) -> CustomerInfo {
    parse(customer_info_body(app_user_id, request_date))
}

struct Fixture {
    manager: InfoCacheManager,
    device_cache: DeviceCache,
}

fn fixture(base_url: &str) -> Fixture {
    let config = ClientConfig::builder("appl_key").base_url(base_url).build();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::builder(100).build());
    let backend = Arc::new(Backend::new(&config, store.clone()).unwrap());
    let device_cache = DeviceCache::new(store, FreshnessPolicy::default());
    let manager = InfoCacheManager::new(backend, device_cache.clone(), &config);
    Fixture {
        manager,
        device_cache,
    }
}

/// Counts delegate calls.
#[derive(Clone, Default)]
struct Counter(Arc<AtomicUsize>);

impl Counter {
    fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl CustomerInfoDelegate for Counter {
    fn on_customer_info_updated(&self, _customer_info: &CustomerInfo) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

async fn mount_customer_info(server: &MockServer, app_user_id: &str, expected: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/subscribers/{app_user_id}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(customer_info_body(app_user_id, "2019-08-16T10:30:42Z")),
        )
        .expect(expected)
        .mount(server)
        .await;
}

/// A fetch caches the snapshot, marks it fresh and tells the delegate once.
#[tokio::test]
async fn test_fetch_caches_and_notifies() {
    let server = MockServer::start().await;
    mount_customer_info(&server, "cesar", 1).await;
    let Fixture {
        manager,
        device_cache,
    } = fixture(&server.uri());
    let delegate = Counter::default();
    manager.set_delegate(Some(Arc::new(delegate.clone())));

    let info = manager.fetch("cesar", false).await.unwrap();

    assert_eq!(info, customer_info("cesar", "2019-08-16T10:30:42Z"));
    assert_eq!(manager.cached_customer_info("cesar").await, Some(info.clone()));
    assert_eq!(manager.last_sent_customer_info(), Some(info));
    assert_eq!(delegate.get(), 1);
    assert!(!device_cache.is_customer_info_stale("cesar", false).await);
}

/// A failed fetch keeps the snapshot but marks it stale.
#[tokio::test]
async fn test_failed_fetch_clears_timestamp() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"code": 7110})))
        .expect(1)
        .mount(&server)
        .await;
    let Fixture {
        manager,
        device_cache,
    } = fixture(&server.uri());
    let cached = customer_info("cesar", "2019-08-16T10:30:42Z");
    manager.cache(&cached, "cesar").await;
    device_cache.set_customer_info_timestamp_to_now("cesar").await;

    let error = manager.fetch("cesar", false).await.unwrap_err();

    assert!(matches!(error, PurchasesError::Backend(_)));
    assert_eq!(device_cache.customer_info_timestamp("cesar").await, None);
    assert_eq!(manager.cached_customer_info("cesar").await, Some(cached));
}

/// A fresh snapshot is returned without going to the network.
#[tokio::test]
async fn test_fetch_if_stale_uses_fresh_cache() {
    let server = MockServer::start().await;
    mount_customer_info(&server, "cesar", 0).await;
    let Fixture {
        manager,
        device_cache,
    } = fixture(&server.uri());
    let cached = customer_info("cesar", "2019-08-16T10:30:42Z");
    manager.cache(&cached, "cesar").await;
    device_cache.set_customer_info_timestamp_to_now("cesar").await;

    let info = manager.fetch_if_stale("cesar", false).await.unwrap();

    assert_eq!(info, cached);
}

/// A stale snapshot is refetched.
#[tokio::test]
async fn test_fetch_if_stale_refreshes_stale_cache() {
    let server = MockServer::start().await;
    mount_customer_info(&server, "cesar", 1).await;
    let Fixture {
        manager,
        device_cache,
    } = fixture(&server.uri());
    manager
        .cache(&customer_info("cesar", "2019-01-01T00:00:00Z"), "cesar")
        .await;
    device_cache
        .set_customer_info_timestamp("cesar", Utc::now() - TimeDelta::minutes(10))
        .await;

    let info = manager.fetch_if_stale("cesar", false).await.unwrap();

    assert_eq!(info, customer_info("cesar", "2019-08-16T10:30:42Z"));
}

/// Concurrent fetches for one user share one request.
#[tokio::test]
async fn test_concurrent_fetches_are_coalesced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/subscribers/cesar"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(customer_info_body("cesar", "2019-08-16T10:30:42Z"))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    let Fixture { manager, .. } = fixture(&server.uri());

    let (first, second) = tokio::join!(
        manager.fetch("cesar", false),
        manager.fetch("cesar", false),
    );

    assert_eq!(first.unwrap(), second.unwrap());
}

/// A stale snapshot is vended right away and refreshed in the background.
#[tokio::test]
async fn test_customer_info_vends_cache_and_refreshes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/subscribers/cesar"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(entitled_body("cesar", "2019-08-16T10:30:42Z")),
        )
        .expect(1)
        .mount(&server)
        .await;
    let Fixture { manager, .. } = fixture(&server.uri());
    let stale = customer_info("cesar", "2019-01-01T00:00:00Z");
    manager.cache(&stale, "cesar").await;

    let vended = manager.customer_info("cesar", false).await.unwrap();
    assert_eq!(vended, stale);

    let fresh = parse(entitled_body("cesar", "2019-08-16T10:30:42Z"));
    assert_ne!(fresh, stale);
    for _ in 0..100 {
        if manager.cached_customer_info("cesar").await.as_ref() == Some(&fresh) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("the cached snapshot was never refreshed");
}

/// Without a snapshot the call waits for the network.
#[tokio::test]
async fn test_customer_info_without_cache_fetches() {
    let server = MockServer::start().await;
    mount_customer_info(&server, "cesar", 1).await;
    let Fixture { manager, .. } = fixture(&server.uri());

    let info = manager.customer_info("cesar", false).await.unwrap();

    assert_eq!(info.original_app_user_id(), "cesar");
}

/// The same snapshot is not delivered twice in a row.
#[tokio::test]
async fn test_unchanged_snapshot_is_not_redelivered() {
    let server = MockServer::start().await;
    let Fixture { manager, .. } = fixture(&server.uri());
    let delegate = Counter::default();
    let monitor = Counter::default();
    manager.set_delegate(Some(Arc::new(delegate.clone())));
    let _handle = manager.monitor_changes(monitor.clone());

    let info = customer_info("cesar", "2019-08-16T10:30:42Z");
    manager.cache(&info, "cesar").await;
    manager.cache(&info, "cesar").await;
    manager.send_cached_customer_info_if_available("cesar").await;

    assert_eq!(delegate.get(), 1);
    assert_eq!(monitor.get(), 1);

    // Only the request date differs, so this is still the same snapshot.
    manager
        .cache(&customer_info("cesar", "2019-09-01T00:00:00Z"), "cesar")
        .await;
    assert_eq!(delegate.get(), 1);
    assert_eq!(monitor.get(), 1);

    manager
        .cache(&parse(entitled_body("cesar", "2019-09-01T00:00:00Z")), "cesar")
        .await;
    assert_eq!(delegate.get(), 2);
    assert_eq!(monitor.get(), 2);
}

/// Snapshots written with another schema version are ignored.
#[tokio::test]
async fn test_other_schema_version_is_ignored() {
    let server = MockServer::start().await;
    let Fixture {
        manager,
        device_cache,
    } = fixture(&server.uri());
    let mut old = customer_info_body("cesar", "2019-08-16T10:30:42Z");
    old["schema_version"] = json!("1");
    device_cache
        .write_customer_info(Bytes::from(serde_json::to_vec(&old).unwrap()), "cesar")
        .await;

    assert_eq!(manager.cached_customer_info("cesar").await, None);
}

/// Garbage in the cache reads as no snapshot.
#[tokio::test]
async fn test_unreadable_snapshot_is_ignored() {
    let server = MockServer::start().await;
    let Fixture {
        manager,
        device_cache,
    } = fixture(&server.uri());
    device_cache
        .write_customer_info(Bytes::from_static(b"not json"), "cesar")
        .await;

    assert_eq!(manager.cached_customer_info("cesar").await, None);
}

/// Clearing forgets the snapshot, the timestamp and the last delivery.
#[tokio::test]
async fn test_clear_cache() {
    let server = MockServer::start().await;
    let Fixture {
        manager,
        device_cache,
    } = fixture(&server.uri());
    let delegate = Counter::default();
    manager.set_delegate(Some(Arc::new(delegate.clone())));
    let info = customer_info("cesar", "2019-08-16T10:30:42Z");
    manager.cache(&info, "cesar").await;
    device_cache.set_customer_info_timestamp_to_now("cesar").await;

    manager.clear_cache("cesar").await;

    assert_eq!(manager.cached_customer_info("cesar").await, None);
    assert!(device_cache.is_customer_info_stale("cesar", false).await);
    assert_eq!(manager.last_sent_customer_info(), None);

    manager.cache(&info, "cesar").await;
    assert_eq!(delegate.get(), 2);
}
