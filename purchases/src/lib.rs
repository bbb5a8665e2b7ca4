#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Typed backend façade with request coalescing.
///
/// [`Backend`](backend::Backend) exposes one async method per endpoint and
/// maps responses to [`PurchasesError`] variants.
pub mod backend;

/// Client configuration loaded from code or YAML.
pub mod config;

/// The customer info cache manager.
///
/// [`InfoCacheManager`](customer_info::InfoCacheManager) decides between the
/// cached snapshot and a fetch, and notifies listeners of changes.
pub mod customer_info;

/// Persisted customer info snapshots and fetch timestamps.
pub mod device_cache;

/// Owned background tasks, cancelled with their owner.
pub mod dispatch;

/// Error types.
///
/// Defines [`PurchasesError`] which covers:
/// - Invalid input (missing app user id, empty attributes)
/// - Network failures, including API hosts blocked by DNS
/// - Backend error responses and unexpected response bodies
pub mod error;

/// ETag response cache.
pub mod etag;

/// Detection of API hosts blocked by DNS.
pub mod host_guard;

/// Metrics collection.
///
/// When the `metrics` feature is enabled this module records counters for
/// requests, retries, ETag hits, coalesced calls and customer info fetches.
pub mod metrics;

/// Serial HTTP transport.
pub mod transport;

pub use backend::{Backend, LogInResult, PostReceipt};
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError, FreshnessPolicy, PlatformInfo};
pub use customer_info::{ChangeMonitor, CustomerInfoDelegate, InfoCacheManager};
pub use device_cache::DeviceCache;
pub use error::{BackendFailure, PurchasesError, PurchasesResult, TransportError, UnexpectedResponse};
pub use etag::ResponseCache;
pub use host_guard::{HostResolutionGuard, HostResolver};
pub use transport::{HttpRequest, HttpResponse, RequestPath, RequestTransport};

pub use purchases_core::{
    AppUserId, AttributionNetwork, CustomerInfo, HttpStatus, IntroEligibility, JsonObject,
    OfferSigningRequest, PaymentMode, ProductInfo, SignedOffer, SubscriberAttribute,
    SubscriberAttributes,
};
pub use purchases_store::{FeOxDbStore, MemoryStore, Store};
