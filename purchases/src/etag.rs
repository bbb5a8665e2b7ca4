//! ETag based response cache.
//!
//! The backend answers a request carrying a current validator with
//! `304 Not Modified` and no body. [`ResponseCache`] remembers the last
//! full response for every URL so the transport can hand the cached body
//! back in that case.
//!
//! A `304` for a URL with no cached entry can't be answered locally (the
//! entry may have been wiped while the backend still remembers the
//! validator). The cache then reports the response as ambiguous and the
//! transport sends the request once more with an empty validator.

use std::sync::Arc;

use bytes::Bytes;
use purchases_core::{HttpStatus, JsonObject};
use purchases_store::{Store, StoreKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::metrics;
use crate::transport::HttpResponse;

/// Request and response header carrying the validator.
pub const ETAG_HEADER: &str = "X-RevenueCat-ETag";

/// Store domain holding the cached entries.
pub const ETAG_DOMAIN: &str = "etags";

/// A cached response, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedETagEntry {
    /// The validator sent back on the next request.
    #[serde(rename = "eTag")]
    pub etag: String,
    /// Status of the cached response.
    pub status_code: HttpStatus,
    /// Body of the cached response.
    pub json_body: JsonObject,
}

/// Persists the last full response per request URL.
///
/// Each operation reads or writes the store exactly once and holds no lock
/// of its own, so reconciliation can never re-enter itself.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn Store>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("store", &self.store.label())
            .finish()
    }
}

impl ResponseCache {
    /// Creates a cache on top of `store`.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Validator to send for `url`.
    ///
    /// Empty when nothing is cached or when `force_refresh` is set.
    pub async fn header_value(&self, url: &str, force_refresh: bool) -> String {
        if force_refresh {
            return String::new();
        }
        match self.stored_entry(url).await {
            Some(entry) => {
                debug!(url, etag = %entry.etag, "Using cached ETag");
                entry.etag
            }
            None => String::new(),
        }
    }

    /// Decides what the transport hands back for a fresh network response.
    ///
    /// `etag` is the validator the response carried, if any. Returns `None`
    /// when the response is a `304` that can't be answered from the cache;
    /// this only happens when `is_retry` is `false`.
    pub async fn reconcile(
        &self,
        url: &str,
        response: HttpResponse,
        etag: Option<&str>,
        is_retry: bool,
    ) -> Option<HttpResponse> {
        let Some(etag) = etag else {
            return Some(response);
        };

        if response.status == HttpStatus::NOT_MODIFIED {
            if let Some(entry) = self.stored_entry(url).await {
                debug!(url, status = %entry.status_code, "Serving 304 from ETag cache");
                metrics::etag_hit();
                return Some(HttpResponse {
                    status: entry.status_code,
                    body: Some(entry.json_body),
                    json_error: None,
                });
            }
            if is_retry {
                warn!(url, "No cached response for 304 after a forced refresh");
                return Some(response);
            }
            debug!(url, "No cached response for 304, retrying without ETag");
            return None;
        }

        if !response.status.is_server_error() {
            if let Some(body) = &response.body {
                self.store_entry(
                    url,
                    CachedETagEntry {
                        etag: etag.to_owned(),
                        status_code: response.status,
                        json_body: body.clone(),
                    },
                )
                .await;
            }
        }
        Some(response)
    }

    /// Removes every cached entry.
    pub async fn clear(&self) {
        debug!("Clearing ETag cache");
        if let Err(error) = self.store.remove_all(ETAG_DOMAIN).await {
            warn!(%error, "Failed to clear ETag cache");
        }
    }

    async fn stored_entry(&self, url: &str) -> Option<CachedETagEntry> {
        let bytes = match self.store.read(&StoreKey::new(ETAG_DOMAIN, url)).await {
            Ok(bytes) => bytes?,
            Err(error) => {
                warn!(url, %error, "Failed to read ETag cache");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(error) => {
                warn!(url, %error, "Discarding unreadable ETag cache entry");
                None
            }
        }
    }

    async fn store_entry(&self, url: &str, entry: CachedETagEntry) {
        let encoded = match serde_json::to_vec(&entry) {
            Ok(encoded) => Bytes::from(encoded),
            Err(error) => {
                warn!(url, %error, "Failed to encode ETag cache entry");
                return;
            }
        };
        debug!(url, etag = %entry.etag, status = %entry.status_code, "Storing ETag response");
        if let Err(error) = self
            .store
            .write(&StoreKey::new(ETAG_DOMAIN, url), encoded)
            .await
        {
            warn!(url, %error, "Failed to write ETag cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use purchases_store::MemoryStore;
    use serde_json::json;

    const URL: &str = "https://api.example.com/v1/subscribers/cesar";

    fn cache() -> ResponseCache {
        ResponseCache::new(Arc::new(MemoryStore::builder(100).build()))
    }

    fn object(value: serde_json::Value) -> JsonObject {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn response(status: u16, body: Option<JsonObject>) -> HttpResponse {
        HttpResponse {
            status: HttpStatus::new(status),
            body,
            json_error: None,
        }
    }

    /// A stored 200 answers a later 304 with the cached body.
    #[tokio::test]
    async fn test_not_modified_served_from_cache() {
        let cache = cache();
        let fresh = response(200, Some(object(json!({"a": 1}))));
        cache.reconcile(URL, fresh, Some("abc"), false).await;
        assert_eq!(cache.header_value(URL, false).await, "abc");

        let result = cache
            .reconcile(URL, response(304, Some(JsonObject::new())), Some("abc"), false)
            .await
            .unwrap();
        assert_eq!(result.status, HttpStatus::SUCCESS);
        assert_eq!(result.body, Some(object(json!({"a": 1}))));
    }

    #[tokio::test]
    async fn test_not_modified_without_entry_is_ambiguous() {
        let cache = cache();
        let result = cache
            .reconcile(URL, response(304, None), Some("abc"), false)
            .await;
        assert!(result.is_none());
    }

    /// After the forced refresh the raw 304 is returned instead of retrying again.
    #[tokio::test]
    async fn test_not_modified_on_retry_passes_through() {
        let cache = cache();
        let result = cache
            .reconcile(URL, response(304, None), Some("abc"), true)
            .await
            .unwrap();
        assert_eq!(result.status, HttpStatus::NOT_MODIFIED);
        assert_eq!(result.body, None);
    }

    #[tokio::test]
    async fn test_server_errors_are_not_stored() {
        let cache = cache();
        let failed = response(500, Some(object(json!({"code": 7110}))));
        cache.reconcile(URL, failed, Some("abc"), false).await;
        assert_eq!(cache.header_value(URL, false).await, "");
    }

    #[tokio::test]
    async fn test_response_without_etag_is_not_stored() {
        let cache = cache();
        let fresh = response(200, Some(object(json!({"a": 1}))));
        let result = cache.reconcile(URL, fresh.clone(), None, false).await.unwrap();
        assert_eq!(result.body, fresh.body);
        assert_eq!(cache.header_value(URL, false).await, "");
    }

    #[tokio::test]
    async fn test_force_refresh_and_clear() {
        let cache = cache();
        let fresh = response(200, Some(object(json!({"a": 1}))));
        cache.reconcile(URL, fresh, Some("abc"), false).await;

        assert_eq!(cache.header_value(URL, true).await, "");
        cache.clear().await;
        assert_eq!(cache.header_value(URL, false).await, "");
    }

    #[test]
    fn test_entry_wire_format() {
        let entry = CachedETagEntry {
            etag: "abc".into(),
            status_code: HttpStatus::SUCCESS,
            json_body: object(json!({"a": 1})),
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"eTag": "abc", "statusCode": 200, "jsonBody": {"a": 1}})
        );
    }
}
