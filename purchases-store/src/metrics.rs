//! Metrics declaration for store operations.
//!
//! With the `metrics` feature enabled every store records read, write and
//! delete counts labelled with the store label. Without it, [`record`] is a
//! no-op.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Track number of store reads.
    pub static ref STORE_READ_COUNTER: &'static str = {
        metrics::describe_counter!(
            "purchases_store_read_total",
            "Total number of store read operations."
        );
        "purchases_store_read_total"
    };
    /// Track number of store writes.
    pub static ref STORE_WRITE_COUNTER: &'static str = {
        metrics::describe_counter!(
            "purchases_store_write_total",
            "Total number of store write operations."
        );
        "purchases_store_write_total"
    };
    /// Track number of store deletions, single keys and whole domains.
    pub static ref STORE_REMOVE_COUNTER: &'static str = {
        metrics::describe_counter!(
            "purchases_store_remove_total",
            "Total number of store remove operations."
        );
        "purchases_store_remove_total"
    };
}

/// Kind of store operation being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    /// A read.
    Read,
    /// A write.
    Write,
    /// A single-key or whole-domain removal.
    Remove,
}

/// Records one store operation.
#[cfg(feature = "metrics")]
#[inline]
pub fn record(op: StoreOp, label: &purchases_core::StoreLabel) {
    let name = match op {
        StoreOp::Read => *STORE_READ_COUNTER,
        StoreOp::Write => *STORE_WRITE_COUNTER,
        StoreOp::Remove => *STORE_REMOVE_COUNTER,
    };
    metrics::counter!(name, "store" => label.to_string()).increment(1);
}

/// Records one store operation.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record(_op: StoreOp, _label: &purchases_core::StoreLabel) {}
