//! Serial HTTP transport.
//!
//! [`RequestTransport`] sends at most one request at a time. Requests are
//! sent in the order [`RequestTransport::perform`] was called, so the
//! backend sees a client's writes in the order the client made them.
//!
//! The only exception to FIFO order is the ETag retry: when a `304` can't be
//! answered from the [`ResponseCache`], the same request is sent again with
//! an empty validator before anything queued behind it. A request is retried
//! at most once.

mod headers;
mod request;
mod response;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use http::header::{HeaderMap, HeaderName, HeaderValue};
use purchases_core::HttpStatus;
use purchases_store::Store;
use reqwest::Url;
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub(crate) use headers::authorization;
pub use request::{HttpRequest, RequestPath};
pub use response::{HttpResponse, HttpResult, ResponseFuture};

use crate::config::{ClientConfig, ConfigError};
use crate::dispatch::TaskDispatcher;
use crate::error::TransportError;
use crate::etag::{ETAG_HEADER, ResponseCache};
use crate::host_guard::HostResolutionGuard;
use crate::metrics;

const ETAG_REQUEST_HEADER: HeaderName = HeaderName::from_static("x-revenuecat-etag");

struct PendingRequest {
    request: HttpRequest,
    headers: HeaderMap,
    completion: oneshot::Sender<HttpResult>,
}

#[derive(Default)]
struct QueueState {
    /// Endpoint of the request on the wire, if any.
    in_flight: Option<&'static str>,
    queued: VecDeque<PendingRequest>,
}

enum Attempt {
    Done(HttpResult),
    /// The ETag cache asked for a refetch. Carries the response as received.
    Retry(HttpResponse),
}

impl Attempt {
    /// Result of a retried request: a second retry is not honored and the
    /// response is handed back as received.
    fn into_final(self) -> HttpResult {
        match self {
            Attempt::Done(result) => result,
            Attempt::Retry(response) => {
                warn!(status = %response.status, "Retry requested for a retried request");
                Ok(response)
            }
        }
    }
}

struct TransportInner {
    client: reqwest::Client,
    base_url: Url,
    default_headers: HeaderMap,
    etags: ResponseCache,
    guard: HostResolutionGuard,
    queue: Mutex<QueueState>,
    dispatcher: TaskDispatcher,
}

/// Serializes requests to the backend.
///
/// Dropping the transport aborts the request on the wire; every request
/// still waiting then completes with [`TransportError::Cancelled`].
pub struct RequestTransport {
    inner: Arc<TransportInner>,
}

impl std::fmt::Debug for RequestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestTransport")
            .field("base_url", &self.inner.base_url.as_str())
            .field("queued", &self.queued_count())
            .finish_non_exhaustive()
    }
}

impl RequestTransport {
    /// Starts building a transport for `config`, caching ETags in `store`.
    pub fn builder(config: ClientConfig, store: Arc<dyn Store>) -> RequestTransportBuilder {
        RequestTransportBuilder {
            config,
            response_cache: ResponseCache::new(store),
            guard: None,
        }
    }

    /// Enqueues `request` and returns a future resolving to its result.
    ///
    /// The request is queued before this returns, whether or not the future
    /// is ever polled. `headers` override the default headers.
    pub fn perform(&self, request: HttpRequest, headers: HeaderMap) -> ResponseFuture {
        let (completion, receiver) = oneshot::channel();
        let pending = PendingRequest {
            request,
            headers,
            completion,
        };

        let start = {
            let mut state = self.lock_queue();
            if let Some(in_flight) = state.in_flight {
                debug!(
                    path = %pending.request.path,
                    in_flight,
                    queued = state.queued.len() + 1,
                    "Queueing request"
                );
                state.queued.push_back(pending);
                None
            } else {
                state.in_flight = Some(pending.request.path.name());
                Some(pending)
            }
        };

        if let Some(pending) = start {
            let inner = self.inner.clone();
            self.inner
                .dispatcher
                .spawn("queue_driver", drive_queue(inner, pending));
        }

        ResponseFuture { receiver }
    }

    /// Wipes the ETag cache.
    pub async fn clear_cache(&self) {
        self.inner.etags.clear().await;
    }

    /// Number of requests waiting behind the one on the wire.
    pub fn queued_count(&self) -> usize {
        self.lock_queue().queued.len()
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.inner.lock_queue()
    }
}

impl Drop for RequestTransport {
    fn drop(&mut self) {
        self.inner.dispatcher.cancel_all();
    }
}

/// Builder for [`RequestTransport`].
pub struct RequestTransportBuilder {
    config: ClientConfig,
    response_cache: ResponseCache,
    guard: Option<HostResolutionGuard>,
}

impl RequestTransportBuilder {
    /// Replaces the DNS blocking detector.
    pub fn host_guard(mut self, guard: HostResolutionGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Validates the configuration and creates the transport.
    pub fn build(self) -> Result<RequestTransport, ConfigError> {
        let base_url = parse_base_url(&self.config.base_url)?;
        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .build()?;

        Ok(RequestTransport {
            inner: Arc::new(TransportInner {
                client,
                base_url,
                default_headers: headers::default_headers(&self.config)?,
                etags: self.response_cache,
                guard: self.guard.unwrap_or_default(),
                queue: Mutex::new(QueueState::default()),
                dispatcher: TaskDispatcher::new("transport"),
            }),
        })
    }
}

fn parse_base_url(value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: value.to_owned(),
        reason,
    };
    let url = Url::parse(value).map_err(|error| invalid(error.to_string()))?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(invalid("must be an absolute http(s) URL".to_owned()));
    }
    Ok(url)
}

/// Runs queued requests one after another until the queue is empty.
async fn drive_queue(inner: Arc<TransportInner>, first: PendingRequest) {
    let mut next = Some(first);
    while let Some(PendingRequest {
        request,
        headers,
        completion,
    }) = next
    {
        let result = match inner.execute(&request, &headers, false).await {
            Attempt::Done(result) => result,
            Attempt::Retry(_) => {
                debug!(path = %request.path, "Retrying with a forced ETag refresh");
                metrics::request_retried();
                inner.execute(&request, &headers, true).await.into_final()
            }
        };

        if completion.send(result).is_err() {
            debug!(path = %request.path, "Request issuer went away before completion");
        }

        let mut state = inner.lock_queue();
        next = state.queued.pop_front();
        state.in_flight = next.as_ref().map(|pending| pending.request.path.name());
    }
}

impl TransportInner {
    fn lock_queue(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn url_for(&self, request: &HttpRequest) -> Result<Url, TransportError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/v1{}", request.path))
            .map_err(|error| TransportError::InvalidRequest(Arc::new(error)))
    }

    async fn execute(&self, request: &HttpRequest, headers: &HeaderMap, retried: bool) -> Attempt {
        let url = match self.url_for(request) {
            Ok(url) => url,
            Err(error) => return Attempt::Done(Err(error)),
        };
        let body = match &request.body {
            Some(Ok(body)) => Some(body.clone()),
            Some(Err(error)) => {
                warn!(path = %request.path, %error, "Request body could not be encoded");
                return Attempt::Done(Err(TransportError::InvalidRequest(error.clone())));
            }
            None => None,
        };

        let etag = self.etags.header_value(url.as_str(), retried).await;
        let mut merged = self.default_headers.clone();
        for (name, value) in headers {
            merged.insert(name.clone(), value.clone());
        }
        merged.insert(
            ETAG_REQUEST_HEADER,
            HeaderValue::from_str(&etag).unwrap_or_else(|_| HeaderValue::from_static("")),
        );

        let mut builder = self
            .client
            .request(request.method.clone(), url.clone())
            .headers(merged);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        debug!(method = %request.method, %url, retried, "Sending request");
        metrics::request_sent(&request.method);

        let response = match builder.send().await {
            Ok(response) => response,
            Err(error) => {
                let error = self.guard.classify(error).await;
                warn!(method = %request.method, %url, %error, "Request failed");
                return Attempt::Done(Err(error));
            }
        };

        let status = HttpStatus::new(response.status().as_u16());
        let response_etag = response
            .headers()
            .get(ETAG_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(error) => return Attempt::Done(Err(self.guard.classify(error).await)),
        };
        debug!(method = %request.method, %url, %status, "Response received");

        let decoded = HttpResponse::decode(status, &bytes);
        match self
            .etags
            .reconcile(url.as_str(), decoded.clone(), response_etag.as_deref(), retried)
            .await
        {
            Some(response) => Attempt::Done(Ok(response)),
            None => Attempt::Retry(decoded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_must_be_absolute() {
        assert!(parse_base_url("https://api.revenuecat.com").is_ok());
        assert!(matches!(
            parse_base_url("api.revenuecat.com"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            parse_base_url("mailto:someone@example.com"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_second_retry_returns_response_as_received() {
        let not_modified = HttpResponse::decode(HttpStatus::NOT_MODIFIED, b"");
        let result = Attempt::Retry(not_modified.clone()).into_final().unwrap();
        assert_eq!(result.status, HttpStatus::NOT_MODIFIED);
        assert_eq!(result.body, not_modified.body);

        let done = HttpResponse::decode(HttpStatus::SUCCESS, b"{}");
        let result = Attempt::Done(Ok(done)).into_final().unwrap();
        assert_eq!(result.status, HttpStatus::SUCCESS);
    }
}
