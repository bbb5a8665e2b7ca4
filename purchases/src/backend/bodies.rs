//! Request bodies, field names as the backend expects them.

use purchases_core::{
    AttributionNetwork, FetchToken, JsonObject, ProductInfo, SubscriberAttributes,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct ReceiptBody<'a> {
    pub fetch_token: &'a FetchToken,
    pub app_user_id: &'a str,
    pub is_restore: bool,
    pub observer_mode: bool,
    #[serde(flatten)]
    pub product: Option<&'a ProductInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<&'a SubscriberAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presented_offering_identifier: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AliasBody<'a> {
    pub new_app_user_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct LogInBody<'a> {
    pub app_user_id: &'a str,
    pub new_app_user_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttributionBody<'a> {
    pub network: AttributionNetwork,
    pub data: &'a JsonObject,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubscriberAttributesBody<'a> {
    pub attributes: &'a SubscriberAttributes,
}

#[derive(Debug, Serialize)]
pub(crate) struct IntroEligibilityBody<'a> {
    pub product_identifiers: &'a [String],
    pub fetch_token: FetchToken,
}

#[derive(Debug, Serialize)]
pub(crate) struct OfferBody<'a> {
    pub app_user_id: &'a str,
    pub fetch_token: FetchToken,
    pub generate_offers: [GenerateOffer<'a>; 1],
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerateOffer<'a> {
    pub offer_id: &'a str,
    pub product_id: &'a str,
    pub subscription_group: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use purchases_core::PaymentMode;
    use serde_json::json;

    /// Product fields sit next to the receipt fields, unset ones are left out.
    #[test]
    fn test_receipt_body_flattens_product() {
        let token = FetchToken::from_receipt(b"an awesome receipt");
        let product = ProductInfo {
            product_identifier: Some("monthly".into()),
            payment_mode: Some(PaymentMode::PayAsYouGo),
            ..ProductInfo::default()
        };
        let body = ReceiptBody {
            fetch_token: &token,
            app_user_id: "cesar",
            is_restore: false,
            observer_mode: true,
            product: Some(&product),
            attributes: None,
            presented_offering_identifier: Some("default"),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "fetch_token": "YW4gYXdlc29tZSByZWNlaXB0",
                "app_user_id": "cesar",
                "is_restore": false,
                "observer_mode": true,
                "product_id": "monthly",
                "payment_mode": 0,
                "presented_offering_identifier": "default"
            })
        );
    }
}
