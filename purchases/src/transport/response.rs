use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use purchases_core::{HttpStatus, JsonObject};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::TransportError;

/// Outcome of a request that reached the backend.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code, after ETag reconciliation.
    pub status: HttpStatus,
    /// The decoded body, `None` when it was not a JSON object.
    pub body: Option<JsonObject>,
    /// Why the body could not be decoded, if it could not.
    pub json_error: Option<Arc<serde_json::Error>>,
}

impl HttpResponse {
    /// Decodes a raw response body.
    ///
    /// A `304` or an empty body decodes to an empty object.
    pub(crate) fn decode(status: HttpStatus, bytes: &[u8]) -> Self {
        if status == HttpStatus::NOT_MODIFIED || bytes.is_empty() {
            return Self {
                status,
                body: Some(JsonObject::new()),
                json_error: None,
            };
        }
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(body)) => Self {
                status,
                body: Some(body),
                json_error: None,
            },
            Ok(_) => Self {
                status,
                body: None,
                json_error: None,
            },
            Err(error) => Self {
                status,
                body: None,
                json_error: Some(Arc::new(error)),
            },
        }
    }
}

/// Result delivered to the issuer of a request.
pub type HttpResult = Result<HttpResponse, TransportError>;

/// Resolves once the transport has completed a request.
///
/// Dropping it does not cancel the request; it still runs in queue order.
#[derive(Debug)]
#[must_use = "the response is only observed by awaiting"]
pub struct ResponseFuture {
    pub(crate) receiver: oneshot::Receiver<HttpResult>,
}

impl Future for ResponseFuture {
    type Output = HttpResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(TransportError::Cancelled)))
    }
}
