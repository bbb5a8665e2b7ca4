//! Attribution networks and subscriber attributes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Attribution provider the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributionNetwork {
    /// Apple Search Ads.
    AppleSearchAds,
    /// Adjust.
    Adjust,
    /// AppsFlyer.
    AppsFlyer,
    /// Branch.
    Branch,
    /// Tenjin.
    Tenjin,
    /// Facebook.
    Facebook,
    /// mParticle.
    MParticle,
}

impl AttributionNetwork {
    /// Wire value.
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::AppleSearchAds => 0,
            Self::Adjust => 1,
            Self::AppsFlyer => 2,
            Self::Branch => 3,
            Self::Tenjin => 4,
            Self::Facebook => 5,
            Self::MParticle => 6,
        }
    }
}

impl Serialize for AttributionNetwork {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

/// One subscriber attribute as it was set locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberAttribute {
    /// Attribute value; `None` deletes the attribute on the backend.
    pub value: Option<String>,
    /// When the value was set.
    pub set_time: DateTime<Utc>,
}

impl SubscriberAttribute {
    /// Creates an attribute set now.
    pub fn new(value: impl Into<Option<String>>) -> Self {
        Self {
            value: value.into(),
            set_time: Utc::now(),
        }
    }
}

impl Serialize for SubscriberAttribute {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            value: &'a Option<String>,
            updated_at_ms: i64,
        }

        Wire {
            value: &self.value,
            updated_at_ms: self.set_time.timestamp_millis(),
        }
        .serialize(serializer)
    }
}

/// Attributes keyed by attribute name.
///
/// Ordered so request bodies and coalescing keys are deterministic.
pub type SubscriberAttributes = BTreeMap<String, SubscriberAttribute>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_attribute_wire_format() {
        let attribute = SubscriberAttribute {
            value: Some("a@b.com".into()),
            set_time: Utc.timestamp_millis_opt(1_600_000_000_123).unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&attribute).unwrap(),
            json!({"value": "a@b.com", "updated_at_ms": 1_600_000_000_123_i64})
        );
    }

    #[test]
    fn test_network_wire_value() {
        assert_eq!(serde_json::to_value(AttributionNetwork::Branch).unwrap(), json!(3));
    }
}
