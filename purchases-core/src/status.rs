//! HTTP status codes consumed by the client.
//!
//! The backend contract only distinguishes a handful of codes. Everything at
//! or above [`HttpStatus::REDIRECT`] is treated as an error response; real
//! redirect following is never performed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An HTTP status code as seen by the client.
///
/// Unlike `http::StatusCode` this type can hold the locally produced
/// sentinels ([`HttpStatus::NETWORK_CONNECT_TIMEOUT`] for transport failures
/// and [`HttpStatus::INVALID_REQUEST`] for requests that could not be built)
/// without going through a fallible constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HttpStatus(u16);

impl HttpStatus {
    /// 200.
    pub const SUCCESS: Self = Self(200);
    /// 201, returned by identify when a new subscriber was created.
    pub const CREATED: Self = Self(201);
    /// 300, the boundary where error territory starts.
    pub const REDIRECT: Self = Self(300);
    /// 304, the cached validator is still current.
    pub const NOT_MODIFIED: Self = Self(304);
    /// 400, also used locally for requests that could not be encoded.
    pub const INVALID_REQUEST: Self = Self(400);
    /// 404.
    pub const NOT_FOUND: Self = Self(404);
    /// 500, the boundary where server errors start.
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);
    /// 599, the sentinel for failures that produced no HTTP response.
    pub const NETWORK_CONNECT_TIMEOUT: Self = Self(599);

    /// Wraps a raw status code.
    #[inline]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// `true` for any status the backend uses to signal failure (`>= 300`).
    #[inline]
    pub fn is_error(self) -> bool {
        self >= Self::REDIRECT
    }

    /// `true` for `5xx` and the local connect-timeout sentinel.
    #[inline]
    pub fn is_server_error(self) -> bool {
        self >= Self::INTERNAL_SERVER_ERROR
    }

    /// Whether the backend accepted the payload even though it reported an error.
    ///
    /// Server errors and `404` mean the data never reached the subscriber
    /// record, so attribute syncing should be retried later.
    #[inline]
    pub fn is_successfully_synced(self) -> bool {
        !(self.is_server_error() || self == Self::NOT_FOUND)
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u16> for HttpStatus {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_boundary() {
        assert!(!HttpStatus::SUCCESS.is_error());
        assert!(!HttpStatus::CREATED.is_error());
        assert!(HttpStatus::REDIRECT.is_error());
        assert!(HttpStatus::NOT_MODIFIED.is_error());
    }

    #[test]
    fn test_successfully_synced() {
        assert!(HttpStatus::INVALID_REQUEST.is_successfully_synced());
        assert!(!HttpStatus::NOT_FOUND.is_successfully_synced());
        assert!(!HttpStatus::INTERNAL_SERVER_ERROR.is_successfully_synced());
        assert!(!HttpStatus::NETWORK_CONNECT_TIMEOUT.is_successfully_synced());
    }
}
