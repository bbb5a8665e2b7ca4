//! Product details attached to receipt posts.

use serde::{Serialize, Serializer};

/// How an introductory price is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentMode {
    /// Billed every period at the intro price.
    PayAsYouGo,
    /// One payment up front for the whole intro duration.
    PayUpFront,
    /// Free trial.
    FreeTrial,
}

impl PaymentMode {
    /// Wire value.
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::PayAsYouGo => 0,
            Self::PayUpFront => 1,
            Self::FreeTrial => 2,
        }
    }
}

impl Serialize for PaymentMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

/// Store product details sent with a purchase so the backend can attribute revenue.
///
/// Every field is optional and omitted from the request body when unset.
/// Durations are ISO 8601 strings such as `P1M`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductInfo {
    /// Product identifier.
    #[serde(rename = "product_id", skip_serializing_if = "Option::is_none")]
    pub product_identifier: Option<String>,
    /// Price in the store's currency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// ISO 4217 currency code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Payment mode of the introductory price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_mode: Option<PaymentMode>,
    /// Introductory price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introductory_price: Option<f64>,
    /// Subscription group of the product.
    #[serde(rename = "subscription_group_id", skip_serializing_if = "Option::is_none")]
    pub subscription_group: Option<String>,
    /// Regular billing period.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normal_duration: Option<String>,
    /// Introductory offer period.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intro_duration: Option<String>,
    /// Free trial period.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_duration: Option<String>,
    /// Storefront country code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_country: Option<String>,
}
