//! Metrics declaration and recording helpers.
//!
//! Every helper is a no-op unless the `metrics` feature is enabled.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    // Transport metrics

    /// Track number of HTTP requests sent.
    pub static ref REQUESTS_SENT: &'static str = {
        metrics::describe_counter!(
            "purchases_requests_sent_total",
            "Total number of HTTP requests sent to the backend."
        );
        "purchases_requests_sent_total"
    };
    /// Track number of forced retries after an unresolvable 304.
    pub static ref REQUEST_RETRIES: &'static str = {
        metrics::describe_counter!(
            "purchases_request_retries_total",
            "Total number of requests re-sent with a forced ETag refresh."
        );
        "purchases_request_retries_total"
    };
    /// Track number of 304 responses answered from the ETag cache.
    pub static ref ETAG_HITS: &'static str = {
        metrics::describe_counter!(
            "purchases_etag_hits_total",
            "Total number of 304 responses served from the ETag cache."
        );
        "purchases_etag_hits_total"
    };
    /// Track number of connection failures caused by a blocked API host.
    pub static ref BLOCKED_HOSTS: &'static str = {
        metrics::describe_counter!(
            "purchases_blocked_host_total",
            "Total number of connection failures reclassified as a blocked host."
        );
        "purchases_blocked_host_total"
    };

    // Backend metrics

    /// Track number of calls that joined an in-flight request.
    pub static ref COALESCED_JOINS: &'static str = {
        metrics::describe_counter!(
            "purchases_coalesced_total",
            "Total number of calls served by an already in-flight request."
        );
        "purchases_coalesced_total"
    };

    // Customer info metrics

    /// Track number of customer info fetches.
    pub static ref CUSTOMER_INFO_FETCHES: &'static str = {
        metrics::describe_counter!(
            "purchases_customer_info_fetch_total",
            "Total number of customer info fetches started."
        );
        "purchases_customer_info_fetch_total"
    };
    /// Track number of failed customer info fetches.
    pub static ref CUSTOMER_INFO_FETCH_FAILURES: &'static str = {
        metrics::describe_counter!(
            "purchases_customer_info_fetch_failures_total",
            "Total number of customer info fetches that failed."
        );
        "purchases_customer_info_fetch_failures_total"
    };

    // Dispatcher metrics

    /// Track number of tasks spawned.
    pub static ref TASKS_SPAWNED: &'static str = {
        metrics::describe_counter!(
            "purchases_tasks_spawned_total",
            "Total number of background tasks spawned."
        );
        "purchases_tasks_spawned_total"
    };
    /// Track number of tasks run to completion.
    pub static ref TASKS_COMPLETED: &'static str = {
        metrics::describe_counter!(
            "purchases_tasks_completed_total",
            "Total number of background tasks run to completion."
        );
        "purchases_tasks_completed_total"
    };
}

#[cfg(feature = "metrics")]
mod enabled {
    use super::*;

    #[inline]
    pub(crate) fn request_sent(method: &http::Method) {
        metrics::counter!(*REQUESTS_SENT, "method" => method.to_string()).increment(1);
    }

    #[inline]
    pub(crate) fn request_retried() {
        metrics::counter!(*REQUEST_RETRIES).increment(1);
    }

    #[inline]
    pub(crate) fn etag_hit() {
        metrics::counter!(*ETAG_HITS).increment(1);
    }

    #[inline]
    pub(crate) fn blocked_host() {
        metrics::counter!(*BLOCKED_HOSTS).increment(1);
    }

    #[inline]
    pub(crate) fn coalesced(operation: &'static str) {
        metrics::counter!(*COALESCED_JOINS, "operation" => operation).increment(1);
    }

    #[inline]
    pub(crate) fn customer_info_fetch() {
        metrics::counter!(*CUSTOMER_INFO_FETCHES).increment(1);
    }

    #[inline]
    pub(crate) fn customer_info_fetch_failed() {
        metrics::counter!(*CUSTOMER_INFO_FETCH_FAILURES).increment(1);
    }

    #[inline]
    pub(crate) fn task_spawned(kind: &str) {
        metrics::counter!(*TASKS_SPAWNED, "kind" => kind.to_owned()).increment(1);
    }

    #[inline]
    pub(crate) fn task_completed(kind: &str) {
        metrics::counter!(*TASKS_COMPLETED, "kind" => kind.to_owned()).increment(1);
    }
}

#[cfg(not(feature = "metrics"))]
mod enabled {
    #[inline]
    pub(crate) fn request_sent(_method: &http::Method) {}
    #[inline]
    pub(crate) fn request_retried() {}
    #[inline]
    pub(crate) fn etag_hit() {}
    #[inline]
    pub(crate) fn blocked_host() {}
    #[inline]
    pub(crate) fn coalesced(_operation: &'static str) {}
    #[inline]
    pub(crate) fn customer_info_fetch() {}
    #[inline]
    pub(crate) fn customer_info_fetch_failed() {}
    #[inline]
    pub(crate) fn task_spawned(_kind: &str) {}
    #[inline]
    pub(crate) fn task_completed(_kind: &str) {}
}

pub(crate) use enabled::*;
