use std::fmt;

use smol_str::SmolStr;

/// Address of a stored value: a domain plus a key inside it.
///
/// Domains group related entries so they can be dropped together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey {
    domain: SmolStr,
    key: String,
}

impl StoreKey {
    /// Creates a key in `domain`.
    pub fn new(domain: impl Into<SmolStr>, key: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            key: key.into(),
        }
    }

    /// The domain this key belongs to.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The key inside its domain.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Flat byte encoding, `domain` and `key` separated by a NUL byte.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.domain.len() + 1 + self.key.len());
        bytes.extend_from_slice(self.domain.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(self.key.as_bytes());
        bytes
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.key)
    }
}
