//! Receipt encoding.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

/// A receipt encoded the way the backend expects it in `fetch_token` fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FetchToken(String);

impl FetchToken {
    /// Base64-encodes raw receipt bytes.
    pub fn from_receipt(receipt: &[u8]) -> Self {
        Self(STANDARD.encode(receipt))
    }

    /// The encoded token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FetchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_receipt() {
        assert_eq!(FetchToken::from_receipt(b"an awesome receipt").as_str(), "YW4gYXdlc29tZSByZWNlaXB0");
    }
}
