//! Validated subscriber identifiers.

use std::fmt;

use smol_str::SmolStr;
use thiserror::Error;

/// Returned when an app user id is empty after trimming whitespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("app user id is missing or empty")]
pub struct MissingAppUserId;

/// The backend-facing identifier of a subscriber.
///
/// Holds both the trimmed identifier, which is what request bodies carry,
/// and its percent-encoded form for use as a URL path segment.
///
/// ```
/// use purchases_core::AppUserId;
///
/// let id = AppUserId::parse("  user/with space ").unwrap();
/// assert_eq!(id.as_str(), "user/with space");
/// assert_eq!(id.escaped(), "user%2Fwith%20space");
/// assert!(AppUserId::parse("   ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppUserId {
    raw: SmolStr,
    escaped: SmolStr,
}

impl AppUserId {
    /// Trims and escapes `value`, rejecting empty identifiers.
    pub fn parse(value: &str) -> Result<Self, MissingAppUserId> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(MissingAppUserId);
        }
        Ok(Self {
            raw: SmolStr::new(trimmed),
            escaped: SmolStr::from(urlencoding::encode(trimmed).as_ref()),
        })
    }

    /// The trimmed identifier.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The identifier escaped for a URL path segment.
    #[inline]
    pub fn escaped(&self) -> &str {
        &self.escaped
    }
}

impl fmt::Display for AppUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt(f)
    }
}

impl TryFrom<&str> for AppUserId {
    type Error = MissingAppUserId;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for AppUserId {
    type Error = MissingAppUserId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}
