//! Promotional offer signing.

use serde::{Deserialize, Serialize};

/// What to ask the backend to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferSigningRequest {
    /// Identifier of the promotional offer.
    pub offer_identifier: String,
    /// Product the offer applies to.
    pub product_identifier: String,
    /// Subscription group of the product.
    pub subscription_group: String,
}

/// A signature the store accepts for redeeming a promotional offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOffer {
    /// Base64 signature.
    pub signature: String,
    /// Identifier of the key that produced the signature.
    pub key_identifier: String,
    /// Nonce included in the signed payload.
    pub nonce: String,
    /// Signing time in milliseconds since the epoch.
    pub timestamp: i64,
}
