//! Typed façade over the backend API.
//!
//! [`Backend`] exposes one method per endpoint. Reads and receipt posts are
//! coalesced: while a request for a key is in flight, further calls for the
//! same key wait for it instead of sending their own, and every caller gets
//! the same result.
//!
//! | Operation | Coalescing key |
//! |-----------|----------------|
//! | [`get_customer_info`](Backend::get_customer_info) | request path |
//! | [`post_receipt`](Backend::post_receipt) | every field of the post |
//! | [`get_offerings`](Backend::get_offerings) | request path |
//! | [`create_alias`](Backend::create_alias) | both ids |
//! | [`log_in`](Backend::log_in) | both ids |
//!
//! Customer info fetches and receipt posts share one waitlist.

mod bodies;
mod mapping;
mod waitlist;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use http::HeaderMap;
use purchases_core::{
    AppUserId, AttributionNetwork, CustomerInfo, FetchToken, IntroEligibility, JsonObject,
    OfferSigningRequest, ProductInfo, SignedOffer, SubscriberAttributes,
};
use purchases_store::Store;
use tracing::{debug, warn};

use crate::config::{ClientConfig, ConfigError};
use crate::dispatch::TaskDispatcher;
use crate::error::{PurchasesError, PurchasesResult};
use crate::metrics;
use crate::transport::{HttpRequest, RequestPath, RequestTransport, ResponseFuture, authorization};

use bodies::{
    AliasBody, AttributionBody, GenerateOffer, IntroEligibilityBody, LogInBody, OfferBody,
    ReceiptBody, SubscriberAttributesBody,
};
use waitlist::{CallbackStatus, CallbackWaitlist, LeaderGuard};

type Waitlist<T> = Arc<CallbackWaitlist<PurchasesResult<T>>>;

/// A receipt to post, with what is known about the purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct PostReceipt {
    /// Raw receipt data; sent base64 encoded.
    pub receipt: Vec<u8>,
    /// Subscriber the receipt belongs to.
    pub app_user_id: String,
    /// Whether this post restores previous purchases.
    pub is_restore: bool,
    /// Details of the purchased product.
    pub product: Option<ProductInfo>,
    /// Offering the purchase was made from.
    pub presented_offering_identifier: Option<String>,
    /// Whether the app finishes transactions itself.
    pub observer_mode: bool,
    /// Attributes to sync along with the receipt.
    pub subscriber_attributes: Option<SubscriberAttributes>,
}

impl PostReceipt {
    /// A plain receipt post with no product details.
    pub fn new(receipt: impl Into<Vec<u8>>, app_user_id: impl Into<String>) -> Self {
        Self {
            receipt: receipt.into(),
            app_user_id: app_user_id.into(),
            is_restore: false,
            product: None,
            presented_offering_identifier: None,
            observer_mode: false,
            subscriber_attributes: None,
        }
    }

    fn attributes(&self) -> Option<&SubscriberAttributes> {
        self.subscriber_attributes
            .as_ref()
            .filter(|attributes| !attributes.is_empty())
    }

    /// Identifies posts that would send the same body.
    ///
    /// Fields are encoded as a JSON array so that no two distinct posts
    /// share a key, and an unset field stays distinct from an empty one.
    fn coalescing_key(&self, app_user_id: &AppUserId, fetch_token: &FetchToken) -> String {
        serde_json::json!([
            app_user_id.as_str(),
            self.is_restore,
            fetch_token,
            self.product,
            self.presented_offering_identifier,
            self.observer_mode,
            self.attributes(),
        ])
        .to_string()
    }
}

/// Key of a request identified by two subscriber ids.
fn id_pair_key(first: &AppUserId, second: &AppUserId) -> String {
    serde_json::json!([first.as_str(), second.as_str()]).to_string()
}

/// Result of [`Backend::log_in`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogInResult {
    /// Customer info of the identified subscriber.
    pub customer_info: CustomerInfo,
    /// Whether the backend created a new subscriber (`201`).
    pub created: bool,
}

/// The backend API, one method per endpoint.
///
/// Dropping the backend cancels in-flight coalesced requests; their waiters
/// receive [`PurchasesError::Cancelled`].
pub struct Backend {
    transport: RequestTransport,
    auth_headers: HeaderMap,
    customer_info_waitlist: Waitlist<CustomerInfo>,
    offerings_waitlist: Waitlist<JsonObject>,
    alias_waitlist: Waitlist<()>,
    log_in_waitlist: Waitlist<LogInResult>,
    dispatcher: TaskDispatcher,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("transport", &self.transport)
            .field("customer_info_in_flight", &self.customer_info_waitlist.in_flight())
            .field("offerings_in_flight", &self.offerings_waitlist.in_flight())
            .finish_non_exhaustive()
    }
}

impl Backend {
    /// Creates a backend with its own transport, caching ETags in `store`.
    pub fn new(config: &ClientConfig, store: Arc<dyn Store>) -> Result<Self, ConfigError> {
        let transport = RequestTransport::builder(config.clone(), store).build()?;
        Self::with_transport(transport, &config.api_key)
    }

    /// Creates a backend on top of an existing transport.
    pub fn with_transport(transport: RequestTransport, api_key: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            transport,
            auth_headers: authorization(api_key)?,
            customer_info_waitlist: Arc::new(CallbackWaitlist::new("customer_info")),
            offerings_waitlist: Arc::new(CallbackWaitlist::new("offerings")),
            alias_waitlist: Arc::new(CallbackWaitlist::new("alias")),
            log_in_waitlist: Arc::new(CallbackWaitlist::new("log_in")),
            dispatcher: TaskDispatcher::new("backend"),
        })
    }

    /// Fetches the customer info of `app_user_id`.
    pub async fn get_customer_info(&self, app_user_id: &str) -> PurchasesResult<CustomerInfo> {
        let app_user_id = AppUserId::parse(app_user_id)?;
        let path = RequestPath::GetCustomerInfo(app_user_id);
        let key = path.to_string();

        self.coalesced(&self.customer_info_waitlist, key, path.name(), || {
            let response = self.send(HttpRequest::get(path));
            async move { mapping::customer_info(response.await) }
        })
        .await
    }

    /// Posts a receipt and returns the updated customer info.
    ///
    /// Backend failures tell whether the purchase can be finished anyway
    /// ([`BackendFailure::finishable`](crate::BackendFailure::finishable)).
    pub async fn post_receipt(&self, post: &PostReceipt) -> PurchasesResult<CustomerInfo> {
        let app_user_id = AppUserId::parse(&post.app_user_id)?;
        let fetch_token = FetchToken::from_receipt(&post.receipt);
        let key = post.coalescing_key(&app_user_id, &fetch_token);

        self.coalesced(&self.customer_info_waitlist, key, "post_receipt", || {
            let body = ReceiptBody {
                fetch_token: &fetch_token,
                app_user_id: app_user_id.as_str(),
                is_restore: post.is_restore,
                observer_mode: post.observer_mode,
                product: post.product.as_ref(),
                attributes: post.attributes(),
                presented_offering_identifier: post.presented_offering_identifier.as_deref(),
            };
            let response = self.send(HttpRequest::post(RequestPath::PostReceiptData, &body));
            async move { mapping::customer_info(response.await) }
        })
        .await
    }

    /// Makes `new_app_user_id` an alias of `app_user_id`.
    pub async fn create_alias(&self, app_user_id: &str, new_app_user_id: &str) -> PurchasesResult<()> {
        let app_user_id = AppUserId::parse(app_user_id)?;
        let new_app_user_id = AppUserId::parse(new_app_user_id)?;
        let key = id_pair_key(&app_user_id, &new_app_user_id);

        self.coalesced(&self.alias_waitlist, key, "create_alias", || {
            let body = AliasBody {
                new_app_user_id: new_app_user_id.as_str(),
            };
            let response = self.send(HttpRequest::post(RequestPath::CreateAlias(app_user_id), &body));
            async move { mapping::empty(response.await) }
        })
        .await
    }

    /// Posts attribution data from an attribution network.
    pub async fn post_attribution_data(
        &self,
        data: &JsonObject,
        network: AttributionNetwork,
        app_user_id: &str,
    ) -> PurchasesResult<()> {
        let app_user_id = AppUserId::parse(app_user_id)?;
        let body = AttributionBody { network, data };
        let response = self.send(HttpRequest::post(
            RequestPath::PostAttributionData(app_user_id),
            &body,
        ));
        mapping::empty(response.await)
    }

    /// Posts subscriber attributes.
    ///
    /// Failures report whether the backend stored them anyway
    /// ([`BackendFailure::successfully_synced`](crate::BackendFailure::successfully_synced)).
    pub async fn post_subscriber_attributes(
        &self,
        attributes: &SubscriberAttributes,
        app_user_id: &str,
    ) -> PurchasesResult<()> {
        if attributes.is_empty() {
            warn!("No subscriber attributes to post");
            return Err(PurchasesError::EmptySubscriberAttributes);
        }
        let app_user_id = AppUserId::parse(app_user_id)?;
        let body = SubscriberAttributesBody { attributes };
        let response = self.send(HttpRequest::post(
            RequestPath::PostSubscriberAttributes(app_user_id),
            &body,
        ));
        mapping::subscriber_attributes(response.await)
    }

    /// Identifies the current subscriber as `new_app_user_id`.
    pub async fn log_in(
        &self,
        current_app_user_id: &str,
        new_app_user_id: &str,
    ) -> PurchasesResult<LogInResult> {
        let current = AppUserId::parse(current_app_user_id)?;
        let new = AppUserId::parse(new_app_user_id)?;
        let key = id_pair_key(&current, &new);

        self.coalesced(&self.log_in_waitlist, key, "log_in", || {
            let body = LogInBody {
                app_user_id: current.as_str(),
                new_app_user_id: new.as_str(),
            };
            let response = self.send(HttpRequest::post(RequestPath::LogIn, &body));
            async move {
                mapping::log_in(response.await).map(|(customer_info, created)| LogInResult {
                    customer_info,
                    created,
                })
            }
        })
        .await
    }

    /// Fetches the offerings of `app_user_id` as the raw JSON object.
    pub async fn get_offerings(&self, app_user_id: &str) -> PurchasesResult<JsonObject> {
        let app_user_id = AppUserId::parse(app_user_id)?;
        let path = RequestPath::GetOfferings(app_user_id);
        let key = path.to_string();

        self.coalesced(&self.offerings_waitlist, key, path.name(), || {
            let response = self.send(HttpRequest::get(path));
            async move { mapping::offerings(response.await) }
        })
        .await
    }

    /// Checks introductory price eligibility for each product.
    ///
    /// Only an invalid app user id is an error. When eligibility can't be
    /// determined every product is [`IntroEligibility::Unknown`].
    pub async fn get_intro_eligibility(
        &self,
        app_user_id: &str,
        receipt: &[u8],
        product_identifiers: &[String],
    ) -> PurchasesResult<HashMap<String, IntroEligibility>> {
        if product_identifiers.is_empty() {
            return Ok(HashMap::new());
        }
        if receipt.is_empty() {
            warn!(
                products = product_identifiers.len(),
                "Receipt is empty, intro eligibility is unknown"
            );
            return Ok(unknown_eligibility(product_identifiers));
        }
        let app_user_id = AppUserId::parse(app_user_id)?;

        let body = IntroEligibilityBody {
            product_identifiers,
            fetch_token: FetchToken::from_receipt(receipt),
        };
        let response = self.send(HttpRequest::post(
            RequestPath::GetIntroEligibility(app_user_id),
            &body,
        ));
        Ok(mapping::intro_eligibility(response.await, product_identifiers))
    }

    /// Asks the backend to sign a promotional offer.
    pub async fn post_offer_for_signing(
        &self,
        request: &OfferSigningRequest,
        receipt: &[u8],
        app_user_id: &str,
    ) -> PurchasesResult<SignedOffer> {
        let app_user_id = AppUserId::parse(app_user_id)?;
        let body = OfferBody {
            app_user_id: app_user_id.as_str(),
            fetch_token: FetchToken::from_receipt(receipt),
            generate_offers: [GenerateOffer {
                offer_id: &request.offer_identifier,
                product_id: &request.product_identifier,
                subscription_group: &request.subscription_group,
            }],
        };
        let response = self.send(HttpRequest::post(RequestPath::PostOfferForSigning, &body));
        mapping::signed_offer(response.await)
    }

    /// Wipes the ETag cache.
    pub async fn clear_caches(&self) {
        self.transport.clear_cache().await;
    }

    fn send(&self, request: HttpRequest) -> ResponseFuture {
        self.transport.perform(request, self.auth_headers.clone())
    }

    /// Joins the in-flight request for `key`, or starts it.
    ///
    /// `start` enqueues the request synchronously, so calls reach the
    /// transport in the order they were made. The rest of the work runs on
    /// the dispatcher and completes every waiter even if the first caller
    /// stops waiting.
    async fn coalesced<T, Fut>(
        &self,
        waitlist: &Waitlist<T>,
        key: String,
        operation: &'static str,
        start: impl FnOnce() -> Fut,
    ) -> PurchasesResult<T>
    where
        T: Clone + Send + 'static,
        Fut: Future<Output = PurchasesResult<T>> + Send + 'static,
    {
        let (status, receiver) = waitlist.add(&key);
        match status {
            CallbackStatus::FirstCallback => {
                let work = start();
                let guard = LeaderGuard::new(waitlist.clone(), key);
                self.dispatcher.spawn(operation, async move {
                    let result = work.await;
                    let waiters = guard.complete(result);
                    debug!(operation, waiters, "Coalesced request completed");
                });
            }
            CallbackStatus::AddedToExistingInFlightList => metrics::coalesced(operation),
        }
        receiver.await.unwrap_or(Err(PurchasesError::Cancelled))
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.dispatcher.cancel_all();
    }
}

fn unknown_eligibility(product_identifiers: &[String]) -> HashMap<String, IntroEligibility> {
    product_identifiers
        .iter()
        .map(|product| (product.clone(), IntroEligibility::Unknown))
        .collect()
}
