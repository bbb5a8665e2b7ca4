//! Store label type for identifying storage collaborators.
//!
//! `StoreLabel` is a newtype over `SmolStr` used in log fields and metric
//! labels, e.g. `"moka"` or `"feoxdb"`.

use smol_str::SmolStr;
use std::fmt;

/// A label identifying a store.
///
/// ```
/// use purchases_core::StoreLabel;
///
/// let label = StoreLabel::new_static("feoxdb");
/// assert_eq!(label.as_str(), "feoxdb");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StoreLabel(SmolStr);

impl StoreLabel {
    /// Creates a new label.
    #[inline]
    pub fn new(s: impl Into<SmolStr>) -> Self {
        Self(s.into())
    }

    /// Creates a label from a static string (no allocation).
    #[inline]
    pub const fn new_static(s: &'static str) -> Self {
        Self(SmolStr::new_static(s))
    }

    /// Returns the label as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for StoreLabel {
    #[inline]
    fn from(s: &str) -> Self {
        Self(SmolStr::new(s))
    }
}

impl From<String> for StoreLabel {
    #[inline]
    fn from(s: String) -> Self {
        Self(SmolStr::from(s))
    }
}

impl AsRef<str> for StoreLabel {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_static() {
        let label = StoreLabel::new_static("moka");
        assert_eq!(label.as_str(), "moka");
    }
}
