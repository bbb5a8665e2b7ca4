//! Detection of API hosts blocked by DNS.
//!
//! Ad blockers, parental controls and some captive portals answer DNS
//! queries for the API host with a sinkhole address. The resulting
//! connection failure looks like an unreachable server; this module tells
//! the two apart so callers can report the real cause.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::metrics;

/// Whether DNS filters resolve blocked hosts to `address`.
fn is_sinkhole(address: &IpAddr) -> bool {
    address.is_loopback() || address.is_unspecified()
}

/// A transport failure the guard can inspect.
pub trait FailedConnection {
    /// Whether the failure happened while connecting to the host.
    fn is_connect_failure(&self) -> bool;

    /// Host of the request that failed.
    fn failed_host(&self) -> Option<String>;
}

impl FailedConnection for reqwest::Error {
    fn is_connect_failure(&self) -> bool {
        self.is_connect()
    }

    fn failed_host(&self) -> Option<String> {
        self.url()
            .and_then(|url| url.host_str())
            .map(str::to_owned)
    }
}

/// Resolves host names.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Every address `host` resolves to, empty when resolution fails.
    async fn resolve(&self, host: &str) -> Vec<IpAddr>;
}

/// Resolver using the operating system's DNS configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Vec<IpAddr> {
        match tokio::net::lookup_host((host, 443)).await {
            Ok(addresses) => addresses.map(|address| address.ip()).collect(),
            Err(error) => {
                debug!(host, %error, "Host resolution failed");
                Vec::new()
            }
        }
    }
}

/// A host found resolving to a sinkhole address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedHost {
    /// The host name of the failed request.
    pub host: String,
    /// The sinkhole address it resolved to.
    pub address: IpAddr,
}

/// Reclassifies connection failures caused by DNS blocking.
#[derive(Clone)]
pub struct HostResolutionGuard {
    resolver: Arc<dyn HostResolver>,
}

impl std::fmt::Debug for HostResolutionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostResolutionGuard").finish_non_exhaustive()
    }
}

impl Default for HostResolutionGuard {
    fn default() -> Self {
        Self::new(Arc::new(SystemResolver))
    }
}

impl HostResolutionGuard {
    /// Creates a guard resolving hosts with `resolver`.
    pub fn new(resolver: Arc<dyn HostResolver>) -> Self {
        Self { resolver }
    }

    /// The blocked host behind `error`, if it is a connection failure to a
    /// host with any sinkhole among its addresses.
    pub async fn blocked_host_from_error<E>(&self, error: &E) -> Option<BlockedHost>
    where
        E: FailedConnection + ?Sized,
    {
        if !error.is_connect_failure() {
            return None;
        }
        let host = error.failed_host()?;
        let address = self
            .resolver
            .resolve(&host)
            .await
            .into_iter()
            .find(is_sinkhole)?;
        Some(BlockedHost { host, address })
    }

    /// Whether `error` was caused by a blocked API host.
    pub async fn is_blocked_api_error<E>(&self, error: &E) -> bool
    where
        E: FailedConnection + ?Sized,
    {
        self.blocked_host_from_error(error).await.is_some()
    }

    /// Maps a request failure to a [`TransportError`].
    pub(crate) async fn classify(&self, error: reqwest::Error) -> TransportError {
        match self.blocked_host_from_error(&error).await {
            Some(BlockedHost { host, address }) => {
                warn!(host, %address, "API host resolves to a sinkhole address");
                metrics::blocked_host();
                TransportError::BlockedHost { host, address }
            }
            None => TransportError::Network(Arc::new(error)),
        }
    }
}
