//! Mapping of transport results to typed results and errors.

use std::collections::HashMap;

use purchases_core::{CustomerInfo, HttpStatus, IntroEligibility, JsonObject, SignedOffer};
use serde_json::Value;
use tracing::warn;

use crate::error::{BackendFailure, PurchasesError, PurchasesResult, UnexpectedResponse, backend_code};
use crate::transport::{HttpResponse, HttpResult};

/// Splits a transport result into the response and an error for error statuses.
fn checked(result: HttpResult) -> PurchasesResult<HttpResponse> {
    let response = result?;
    if response.status.is_error() {
        let failure = BackendFailure::from_body(response.status, response.body.as_ref());
        warn!(status = %failure.status, code = ?failure.code, message = ?failure.message, "Backend returned an error");
        return Err(failure.into());
    }
    Ok(response)
}

/// The decoded body of a success response.
fn object_body(response: HttpResponse) -> PurchasesResult<JsonObject> {
    if let Some(error) = &response.json_error {
        warn!(status = %response.status, %error, "Response body is not valid JSON");
    }
    response
        .body
        .ok_or_else(|| UnexpectedResponse::MalformedBody.into())
}

/// Per-attribute errors, either at the top level or nested in
/// `attributes_error_response`.
fn attribute_errors(body: Option<&JsonObject>) -> Option<Value> {
    let body = body?;
    body.get("attributes_error_response")
        .and_then(|nested| nested.get("attribute_errors"))
        .or_else(|| body.get("attribute_errors"))
        .filter(|errors| !is_empty(errors))
        .cloned()
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Customer info responses: fetches and receipt posts.
///
/// Error statuses carry the sync flags receipt posting needs. A success
/// that still reports rejected subscriber attributes is an error carrying
/// the parsed customer info.
pub(crate) fn customer_info(result: HttpResult) -> PurchasesResult<CustomerInfo> {
    let response = result?;
    let status = response.status;

    if status.is_error() {
        let body = response.body.as_ref();
        let mut failure = BackendFailure::from_body(status, body);
        failure.finishable = Some(!status.is_server_error());
        failure.successfully_synced = Some(status.is_successfully_synced());
        failure.attribute_errors = attribute_errors(body);
        warn!(%status, code = ?failure.code, message = ?failure.message, "Customer info request failed");
        return Err(failure.into());
    }

    let attribute_errors = attribute_errors(response.body.as_ref());
    let info = parse_customer_info(response)?;

    match attribute_errors {
        Some(errors) => {
            warn!(%status, %errors, "Backend rejected subscriber attributes");
            Err(BackendFailure {
                status,
                code: None,
                message: Some("some subscriber attributes were rejected".to_owned()),
                finishable: Some(true),
                successfully_synced: Some(true),
                attribute_errors: Some(errors),
                customer_info: Some(info),
            }
            .into())
        }
        None => Ok(info),
    }
}

fn parse_customer_info(response: HttpResponse) -> PurchasesResult<CustomerInfo> {
    let body = object_body(response)?;
    CustomerInfo::from_json(body).map_err(|error| {
        warn!(%error, "Customer info could not be parsed");
        UnexpectedResponse::CustomerInfoParsing(error).into()
    })
}

/// Log in responses: the customer info and whether the subscriber was created.
pub(crate) fn log_in(result: HttpResult) -> PurchasesResult<(CustomerInfo, bool)> {
    let response = checked(result)?;
    let created = response.status == HttpStatus::CREATED;
    Ok((parse_customer_info(response)?, created))
}

/// Offerings responses: the raw offerings object.
pub(crate) fn offerings(result: HttpResult) -> PurchasesResult<JsonObject> {
    object_body(checked(result)?)
}

/// Responses whose body carries nothing of interest.
pub(crate) fn empty(result: HttpResult) -> PurchasesResult<()> {
    checked(result).map(|_| ())
}

/// Subscriber attribute posts, which report sync state on failure.
pub(crate) fn subscriber_attributes(result: HttpResult) -> PurchasesResult<()> {
    let response = result?;
    if response.status.is_error() {
        let body = response.body.as_ref();
        let mut failure = BackendFailure::from_body(response.status, body);
        failure.successfully_synced = Some(response.status.is_successfully_synced());
        failure.attribute_errors = attribute_errors(body);
        warn!(status = %failure.status, code = ?failure.code, "Posting subscriber attributes failed");
        return Err(failure.into());
    }
    Ok(())
}

/// Intro eligibility responses.
///
/// Never fails: any problem reports every product as unknown.
pub(crate) fn intro_eligibility(
    result: HttpResult,
    product_identifiers: &[String],
) -> HashMap<String, IntroEligibility> {
    let body = match result {
        Ok(response) if !response.status.is_error() => response.body,
        Ok(response) => {
            warn!(status = %response.status, "Intro eligibility request failed, reporting unknown");
            None
        }
        Err(error) => {
            warn!(%error, "Intro eligibility request failed, reporting unknown");
            None
        }
    };

    product_identifiers
        .iter()
        .map(|product| {
            let value = body.as_ref().and_then(|body| body.get(product));
            (product.clone(), IntroEligibility::from_response_value(value))
        })
        .collect()
}

/// Offer signing responses.
pub(crate) fn signed_offer(result: HttpResult) -> PurchasesResult<SignedOffer> {
    let response = checked(result)?;
    let status = response.status;
    let body = object_body(response)?;

    let offers = body
        .get("offers")
        .and_then(Value::as_array)
        .ok_or(UnexpectedResponse::OffersMissing)?;
    let offer = offers.first().ok_or(UnexpectedResponse::OffersEmpty)?;

    if let Some(signature_error) = offer.get("signature_error").filter(|error| !error.is_null()) {
        let failure = BackendFailure {
            status,
            code: backend_code(signature_error.get("code")),
            message: signature_error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned),
            finishable: None,
            successfully_synced: None,
            attribute_errors: None,
            customer_info: None,
        };
        warn!(code = ?failure.code, message = ?failure.message, "Offer signing was rejected");
        return Err(failure.into());
    }

    let signature_data = offer
        .get("signature_data")
        .ok_or(UnexpectedResponse::SignatureMissing)?;
    let text = |value: Option<&Value>| value.and_then(Value::as_str).map(str::to_owned);

    let signed = (|| {
        Some(SignedOffer {
            signature: text(signature_data.get("signature"))?,
            key_identifier: text(offer.get("key_id"))?,
            nonce: text(signature_data.get("nonce"))?,
            timestamp: signature_data.get("timestamp").and_then(Value::as_i64)?,
        })
    })();
    signed.ok_or_else(|| PurchasesError::from(UnexpectedResponse::SignatureMissing))
}
