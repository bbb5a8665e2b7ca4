#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod error;
mod feoxdb;
mod key;
mod memory;
pub mod metrics;
mod store;

pub use error::{FeOxDbError, StoreError};
pub use feoxdb::{FeOxDbStore, FeOxDbStoreBuilder};
pub use key::StoreKey;
pub use memory::{MemoryStore, MemoryStoreBuilder};
pub use store::{Store, StoreResult};

/// Status of a delete operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    /// This many records were deleted.
    Deleted(u32),
    /// Nothing matched.
    Missing,
}

impl DeleteStatus {
    pub(crate) fn from_count(count: usize) -> Self {
        match count {
            0 => Self::Missing,
            n => Self::Deleted(u32::try_from(n).unwrap_or(u32::MAX)),
        }
    }
}
