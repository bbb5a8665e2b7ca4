#![warn(missing_docs)]
//! # purchases-core
//!
//! Data model shared by the purchases client crates.
//!
//! Nothing in this crate performs I/O. It defines the types that flow
//! between the serial HTTP transport, the request coalescer and the
//! customer info cache:
//!
//! - [`HttpStatus`] - the status-code taxonomy the client branches on
//! - [`AppUserId`] - a validated, path-escaped subscriber identifier
//! - [`CustomerInfo`] - the cached customer info snapshot with its schema gate
//! - [`ProductInfo`], [`SubscriberAttribute`], [`AttributionNetwork`] - request payload parts
//! - [`IntroEligibility`], [`SignedOffer`] - typed endpoint results
//! - [`StoreLabel`] - identifies a storage collaborator in logs and metrics

pub mod attribution;
pub mod customer_info;
pub mod eligibility;
pub mod label;
pub mod offer;
pub mod product;
pub mod receipt;
pub mod status;
pub mod user_id;

pub use attribution::{AttributionNetwork, SubscriberAttribute, SubscriberAttributes};
pub use customer_info::{CURRENT_SCHEMA_VERSION, CustomerInfo, CustomerInfoError};
pub use eligibility::IntroEligibility;
pub use label::StoreLabel;
pub use offer::{OfferSigningRequest, SignedOffer};
pub use product::{PaymentMode, ProductInfo};
pub use receipt::FetchToken;
pub use status::HttpStatus;
pub use user_id::{AppUserId, MissingAppUserId};

/// A decoded JSON object, as exchanged with the backend.
///
/// Key order is preserved so cached bodies serialize back the way they arrived.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;
