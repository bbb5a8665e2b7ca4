//! Error types surfaced by the transport, the backend façade and the
//! customer info cache.
//!
//! Every error is `Clone`: one coalesced network call fans its result out to
//! every waiting caller, so the error has to be handed out more than once.

use std::error::Error as StdError;
use std::net::IpAddr;
use std::sync::Arc;

use purchases_core::{CustomerInfo, CustomerInfoError, HttpStatus, JsonObject, MissingAppUserId};
use serde_json::Value;
use thiserror::Error;

/// Result alias for operations of the backend façade and the cache manager.
pub type PurchasesResult<T> = Result<T, PurchasesError>;

/// Failure of a request before a usable HTTP response was received.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request failed at the network level.
    #[error("network request failed: {0}")]
    Network(Arc<reqwest::Error>),

    /// The API host resolves to a sinkhole address, typically because a
    /// DNS filter or captive portal is blocking it.
    #[error("API host {host} resolves to {address}, it is likely blocked by the network")]
    BlockedHost {
        /// The API hostname.
        host: String,
        /// The sinkhole address it resolved to.
        address: IpAddr,
    },

    /// The request could not be turned into an HTTP request.
    #[error("request could not be built: {0}")]
    InvalidRequest(Arc<dyn StdError + Send + Sync>),

    /// The transport was dropped before the request completed.
    #[error("transport shut down before the request completed")]
    Cancelled,
}

impl TransportError {
    /// Status code reported alongside this error.
    ///
    /// Requests that could not be built report `400`, everything else the
    /// connect-timeout sentinel `599`.
    pub fn status(&self) -> HttpStatus {
        match self {
            Self::InvalidRequest(_) => HttpStatus::INVALID_REQUEST,
            _ => HttpStatus::NETWORK_CONNECT_TIMEOUT,
        }
    }
}

/// Ways a successful-looking response can fail to have the expected shape.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnexpectedResponse {
    /// The body was not a JSON object.
    #[error("response body is missing or not a JSON object")]
    MalformedBody,

    /// The body was JSON but not a valid customer info snapshot.
    #[error("customer info could not be parsed: {0}")]
    CustomerInfoParsing(#[from] CustomerInfoError),

    /// The offers response had no `offers` array.
    #[error("offer signing response has no offers array")]
    OffersMissing,

    /// The `offers` array was empty.
    #[error("offer signing response has an empty offers array")]
    OffersEmpty,

    /// The first offer had neither a signature nor a signature error.
    #[error("offer signing response has no usable signature")]
    SignatureMissing,
}

/// An error response from the backend.
#[derive(Debug, Clone, Error)]
#[error("backend returned status {status}, code {code:?}: {}", .message.as_deref().unwrap_or("no message"))]
pub struct BackendFailure {
    /// HTTP status of the response.
    pub status: HttpStatus,
    /// Backend error code; the backend sends it as a number or a numeric string.
    pub code: Option<i64>,
    /// Human readable message from the backend.
    pub message: Option<String>,
    /// Whether the purchase behind a receipt post can be finished anyway.
    pub finishable: Option<bool>,
    /// Whether subscriber attributes reached the backend despite the error.
    pub successfully_synced: Option<bool>,
    /// Per-attribute errors, as sent by the backend.
    pub attribute_errors: Option<Value>,
    /// Customer info that was returned together with the error, if any.
    pub customer_info: Option<CustomerInfo>,
}

impl BackendFailure {
    /// Builds a failure from a response body, reading `code` and `message`.
    pub fn from_body(status: HttpStatus, body: Option<&JsonObject>) -> Self {
        Self {
            status,
            code: body.and_then(|body| backend_code(body.get("code"))),
            message: body
                .and_then(|body| body.get("message"))
                .and_then(Value::as_str)
                .map(str::to_owned),
            finishable: None,
            successfully_synced: None,
            attribute_errors: None,
            customer_info: None,
        }
    }
}

/// Reads a backend error code that may be a number or a numeric string.
pub(crate) fn backend_code(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number.as_i64(),
        Value::String(string) => string.trim().parse().ok(),
        _ => None,
    }
}

/// Error surfaced to callers of the backend façade and the cache manager.
#[derive(Debug, Clone, Error)]
pub enum PurchasesError {
    /// The app user id was empty after trimming.
    #[error(transparent)]
    MissingAppUserId(#[from] MissingAppUserId),

    /// There were no subscriber attributes to post.
    #[error("no subscriber attributes to post")]
    EmptySubscriberAttributes,

    /// The request failed before a response was received.
    #[error("network error: {0}")]
    Network(#[source] TransportError),

    /// The API host is blocked by the network.
    #[error("API host {host} is blocked by the network or its DNS")]
    BlockedHost {
        /// The blocked hostname.
        host: String,
    },

    /// The backend answered with an error status.
    #[error(transparent)]
    Backend(Box<BackendFailure>),

    /// The backend answered successfully with an unexpected body.
    #[error("unexpected backend response: {0}")]
    UnexpectedBackendResponse(#[source] UnexpectedResponse),

    /// The owning component was dropped before the operation completed.
    #[error("operation cancelled before completion")]
    Cancelled,
}

impl PurchasesError {
    /// Backend failure details, if this is a backend error.
    pub fn backend_failure(&self) -> Option<&BackendFailure> {
        match self {
            Self::Backend(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<TransportError> for PurchasesError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::BlockedHost { host, .. } => Self::BlockedHost { host },
            TransportError::Cancelled => Self::Cancelled,
            other => Self::Network(other),
        }
    }
}

impl From<BackendFailure> for PurchasesError {
    fn from(failure: BackendFailure) -> Self {
        Self::Backend(Box::new(failure))
    }
}

impl From<UnexpectedResponse> for PurchasesError {
    fn from(error: UnexpectedResponse) -> Self {
        Self::UnexpectedBackendResponse(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backend_code_accepts_numbers_and_strings() {
        assert_eq!(backend_code(Some(&json!(7225))), Some(7225));
        assert_eq!(backend_code(Some(&json!("7225"))), Some(7225));
        assert_eq!(backend_code(Some(&json!("oops"))), None);
        assert_eq!(backend_code(Some(&json!(null))), None);
        assert_eq!(backend_code(None), None);
    }

    #[test]
    fn test_blocked_host_is_distinguished() {
        let error = PurchasesError::from(TransportError::BlockedHost {
            host: "api.revenuecat.com".into(),
            address: IpAddr::from([127, 0, 0, 1]),
        });
        assert!(matches!(error, PurchasesError::BlockedHost { host } if host == "api.revenuecat.com"));
    }

    #[test]
    fn test_transport_error_status() {
        let invalid = TransportError::InvalidRequest(Arc::new(std::io::Error::other("bad body")));
        assert_eq!(invalid.status(), HttpStatus::INVALID_REQUEST);
        assert_eq!(TransportError::Cancelled.status(), HttpStatus::NETWORK_CONNECT_TIMEOUT);
    }
}
