use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use purchases_core::AppUserId;
use serde::Serialize;

/// Backend endpoints, relative to the `/v1` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestPath {
    /// `GET /subscribers/{id}`
    GetCustomerInfo(AppUserId),
    /// `POST /receipts`
    PostReceiptData,
    /// `POST /subscribers/{id}/alias`
    CreateAlias(AppUserId),
    /// `POST /subscribers/{id}/attribution`
    PostAttributionData(AppUserId),
    /// `POST /subscribers/{id}/attributes`
    PostSubscriberAttributes(AppUserId),
    /// `POST /subscribers/identify`
    LogIn,
    /// `GET /subscribers/{id}/offerings`
    GetOfferings(AppUserId),
    /// `POST /subscribers/{id}/intro_eligibility`
    GetIntroEligibility(AppUserId),
    /// `POST /offers`
    PostOfferForSigning,
}

impl RequestPath {
    /// Short name used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetCustomerInfo(_) => "get_customer_info",
            Self::PostReceiptData => "post_receipt",
            Self::CreateAlias(_) => "create_alias",
            Self::PostAttributionData(_) => "post_attribution",
            Self::PostSubscriberAttributes(_) => "post_attributes",
            Self::LogIn => "log_in",
            Self::GetOfferings(_) => "get_offerings",
            Self::GetIntroEligibility(_) => "get_intro_eligibility",
            Self::PostOfferForSigning => "post_offer_for_signing",
        }
    }
}

impl fmt::Display for RequestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetCustomerInfo(id) => write!(f, "/subscribers/{}", id.escaped()),
            Self::PostReceiptData => f.write_str("/receipts"),
            Self::CreateAlias(id) => write!(f, "/subscribers/{}/alias", id.escaped()),
            Self::PostAttributionData(id) => {
                write!(f, "/subscribers/{}/attribution", id.escaped())
            }
            Self::PostSubscriberAttributes(id) => {
                write!(f, "/subscribers/{}/attributes", id.escaped())
            }
            Self::LogIn => f.write_str("/subscribers/identify"),
            Self::GetOfferings(id) => write!(f, "/subscribers/{}/offerings", id.escaped()),
            Self::GetIntroEligibility(id) => {
                write!(f, "/subscribers/{}/intro_eligibility", id.escaped())
            }
            Self::PostOfferForSigning => f.write_str("/offers"),
        }
    }
}

/// A logical request handed to the transport.
///
/// The body is encoded when the request is created. An encoding failure is
/// kept and reported through the request's completion rather than at the
/// call site.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub(crate) method: Method,
    pub(crate) path: RequestPath,
    pub(crate) body: Option<Result<Bytes, Arc<serde_json::Error>>>,
}

impl HttpRequest {
    /// A `GET` request without a body.
    pub fn get(path: RequestPath) -> Self {
        Self {
            method: Method::GET,
            path,
            body: None,
        }
    }

    /// A `POST` request with a JSON body.
    pub fn post<B>(path: RequestPath, body: &B) -> Self
    where
        B: Serialize + ?Sized,
    {
        Self {
            method: Method::POST,
            path,
            body: Some(serde_json::to_vec(body).map(Bytes::from).map_err(Arc::new)),
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The endpoint this request targets.
    pub fn path(&self) -> &RequestPath {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_paths_escape_app_user_id() {
        let id = AppUserId::parse("user/1 x").unwrap();
        assert_eq!(
            RequestPath::GetCustomerInfo(id.clone()).to_string(),
            "/subscribers/user%2F1%20x"
        );
        assert_eq!(
            RequestPath::GetIntroEligibility(id).to_string(),
            "/subscribers/user%2F1%20x/intro_eligibility"
        );
        assert_eq!(RequestPath::LogIn.to_string(), "/subscribers/identify");
    }

    #[test]
    fn test_unencodable_body_is_kept_as_error() {
        let mut body = BTreeMap::new();
        body.insert(vec![1u8, 2], 3u8);
        let request = HttpRequest::post(RequestPath::PostReceiptData, &body);
        assert!(matches!(request.body, Some(Err(_))));
    }
}
