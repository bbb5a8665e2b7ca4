//! Customer info snapshots.
//!
//! A [`CustomerInfo`] keeps the raw JSON body it was parsed from so it can be
//! persisted and compared without loss. A handful of fields are validated and
//! exposed as typed accessors; everything else stays in [`CustomerInfo::raw_data`].
//!
//! ## Schema version
//!
//! Snapshots written to durable storage carry a `schema_version` key. Readers
//! treat any snapshot whose version differs from [`CURRENT_SCHEMA_VERSION`] as
//! absent, so the on-disk format can change without breaking old installs.

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::JsonObject;

/// Schema version embedded in every persisted snapshot.
pub const CURRENT_SCHEMA_VERSION: &str = "2";

const SCHEMA_VERSION_KEY: &str = "schema_version";
const REQUEST_DATE_KEY: &str = "request_date";

/// Reasons a JSON body is not a valid customer info snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustomerInfoError {
    /// The `subscriber` object is missing.
    #[error("customer info has no subscriber object")]
    SubscriberMissing,

    /// `request_date` is missing.
    #[error("customer info has no request_date")]
    RequestDateMissing,

    /// `request_date` is not an RFC 3339 timestamp.
    #[error("cannot parse request_date from {0:?}")]
    RequestDateFormat(String),

    /// `subscriber.first_seen` is missing.
    #[error("subscriber has no first_seen")]
    FirstSeenMissing,

    /// `subscriber.first_seen` is not an RFC 3339 timestamp.
    #[error("cannot parse first_seen from {0:?}")]
    FirstSeenFormat(String),

    /// `subscriber.original_app_user_id` is missing.
    #[error("subscriber has no original_app_user_id")]
    OriginalAppUserIdMissing,
}

/// A snapshot of a subscriber's purchase state.
///
/// Equality ignores `request_date`: two snapshots fetched at different times
/// with the same content are equal, which is what change notification needs.
#[derive(Debug, Clone)]
pub struct CustomerInfo {
    raw: JsonObject,
    schema_version: Option<String>,
    request_date: DateTime<Utc>,
    first_seen: DateTime<Utc>,
    original_app_user_id: String,
    original_application_version: Option<String>,
    original_purchase_date: Option<DateTime<Utc>>,
    management_url: Option<String>,
}

impl CustomerInfo {
    /// Parses a backend or persisted JSON object.
    pub fn from_json(data: JsonObject) -> Result<Self, CustomerInfoError> {
        let subscriber = data
            .get("subscriber")
            .and_then(Value::as_object)
            .ok_or(CustomerInfoError::SubscriberMissing)?;

        let request_date = data
            .get(REQUEST_DATE_KEY)
            .and_then(Value::as_str)
            .ok_or(CustomerInfoError::RequestDateMissing)?;
        let request_date = parse_date(request_date)
            .ok_or_else(|| CustomerInfoError::RequestDateFormat(request_date.to_owned()))?;

        let first_seen = subscriber
            .get("first_seen")
            .and_then(Value::as_str)
            .ok_or(CustomerInfoError::FirstSeenMissing)?;
        let first_seen = parse_date(first_seen)
            .ok_or_else(|| CustomerInfoError::FirstSeenFormat(first_seen.to_owned()))?;

        let original_app_user_id = subscriber
            .get("original_app_user_id")
            .and_then(Value::as_str)
            .ok_or(CustomerInfoError::OriginalAppUserIdMissing)?
            .to_owned();

        let original_application_version = subscriber
            .get("original_application_version")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let original_purchase_date = subscriber
            .get("original_purchase_date")
            .and_then(Value::as_str)
            .and_then(parse_date);
        let management_url = subscriber
            .get("management_url")
            .and_then(Value::as_str)
            .map(str::to_owned);

        let schema_version = data
            .get(SCHEMA_VERSION_KEY)
            .and_then(Value::as_str)
            .map(str::to_owned);

        Ok(Self {
            raw: data,
            schema_version,
            request_date,
            first_seen,
            original_app_user_id,
            original_application_version,
            original_purchase_date,
            management_url,
        })
    }

    /// The JSON object this snapshot was parsed from.
    pub fn raw_data(&self) -> &JsonObject {
        &self.raw
    }

    /// Schema version found in the source data, if any.
    ///
    /// Responses straight from the backend carry none; persisted snapshots do.
    pub fn schema_version(&self) -> Option<&str> {
        self.schema_version.as_deref()
    }

    /// Serializable form: the raw data tagged with [`CURRENT_SCHEMA_VERSION`].
    pub fn to_json(&self) -> JsonObject {
        let mut json = self.raw.clone();
        json.insert(
            SCHEMA_VERSION_KEY.to_owned(),
            Value::String(CURRENT_SCHEMA_VERSION.to_owned()),
        );
        json
    }

    /// When the backend produced this snapshot.
    pub fn request_date(&self) -> DateTime<Utc> {
        self.request_date
    }

    /// When the backend first saw this subscriber.
    pub fn first_seen(&self) -> DateTime<Utc> {
        self.first_seen
    }

    /// The identifier the subscriber was originally created with.
    pub fn original_app_user_id(&self) -> &str {
        &self.original_app_user_id
    }

    /// Application version of the first purchase, when known.
    pub fn original_application_version(&self) -> Option<&str> {
        self.original_application_version.as_deref()
    }

    /// Date of the first purchase, when known.
    pub fn original_purchase_date(&self) -> Option<DateTime<Utc>> {
        self.original_purchase_date
    }

    /// URL where the subscriber can manage subscriptions.
    pub fn management_url(&self) -> Option<&str> {
        self.management_url.as_deref()
    }

    /// Raw `subscriber.entitlements` object.
    pub fn entitlements(&self) -> Option<&JsonObject> {
        self.subscriber_field("entitlements")
    }

    /// Raw `subscriber.subscriptions` object, keyed by product identifier.
    pub fn subscriptions(&self) -> Option<&JsonObject> {
        self.subscriber_field("subscriptions")
    }

    fn subscriber_field(&self, key: &str) -> Option<&JsonObject> {
        self.raw
            .get("subscriber")
            .and_then(|subscriber| subscriber.get(key))
            .and_then(Value::as_object)
    }

    fn comparable_json(&self) -> JsonObject {
        let mut json = self.to_json();
        json.remove(REQUEST_DATE_KEY);
        json
    }
}

impl PartialEq for CustomerInfo {
    fn eq(&self, other: &Self) -> bool {
        self.comparable_json() == other.comparable_json()
    }
}

impl TryFrom<JsonObject> for CustomerInfo {
    type Error = CustomerInfoError;

    fn try_from(value: JsonObject) -> Result<Self, Self::Error> {
        Self::from_json(value)
    }
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn body(request_date: &str) -> JsonObject {
        let value = json!({
            "request_date": request_date,
            "subscriber": {
                "first_seen": "2019-07-17T00:05:54Z",
                "original_app_user_id": "cesar",
                "original_application_version": "1.0",
                "management_url": "https://apps.apple.com/account/subscriptions",
                "subscriptions": {},
                "entitlements": {}
            }
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parses_required_fields() {
        let info = CustomerInfo::from_json(body("2019-08-16T10:30:42Z")).unwrap();
        assert_eq!(info.original_app_user_id(), "cesar");
        assert_eq!(info.original_application_version(), Some("1.0"));
        assert_eq!(info.request_date().to_rfc3339(), "2019-08-16T10:30:42+00:00");
        assert_eq!(info.schema_version(), None);
        assert!(info.entitlements().is_some());
    }

    #[test]
    fn test_missing_subscriber() {
        let mut data = body("2019-08-16T10:30:42Z");
        data.remove("subscriber");
        assert_eq!(
            CustomerInfo::from_json(data).unwrap_err(),
            CustomerInfoError::SubscriberMissing
        );
    }

    #[test]
    fn test_bad_request_date() {
        let err = CustomerInfo::from_json(body("yesterday")).unwrap_err();
        assert_eq!(err, CustomerInfoError::RequestDateFormat("yesterday".into()));
    }

    #[test]
    fn test_to_json_tags_current_schema() {
        let info = CustomerInfo::from_json(body("2019-08-16T10:30:42Z")).unwrap();
        let reparsed = CustomerInfo::from_json(info.to_json()).unwrap();
        assert_eq!(reparsed.schema_version(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_equality_ignores_request_date() {
        let a = CustomerInfo::from_json(body("2019-08-16T10:30:42Z")).unwrap();
        let b = CustomerInfo::from_json(body("2020-01-01T00:00:00Z")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_equality_sees_content_changes() {
        let a = CustomerInfo::from_json(body("2019-08-16T10:30:42Z")).unwrap();
        let mut changed = body("2019-08-16T10:30:42Z");
        changed["subscriber"]["entitlements"] = json!({"pro": {"product_identifier": "monthly"}});
        let b = CustomerInfo::from_json(changed).unwrap();
        assert_ne!(a, b);
    }
}
