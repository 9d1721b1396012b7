//! Persistence port for identity code records.
//!
//! The registry never talks to a database directly; it depends on the
//! [`CodeStore`] trait. Two implementations ship with the crate:
//!
//! - [`SqliteCodeStore`]: the production backend. Several handles (threads
//!   or processes) may open the same database file; uniqueness is enforced
//!   by the table's `UNIQUE` constraints, not by the handle's mutex.
//! - [`InMemoryCodeStore`]: a map-backed double with the same constraint
//!   semantics, for tests and embedding.
//!
//! # Contract
//!
//! - [`CodeStore::insert`] must reject a code that already exists with
//!   [`StoreError::DuplicateCode`], atomically with respect to every other
//!   writer of the same store. Callers never pre-check.
//! - [`CodeStore::record_verification`] increments and returns the counter
//!   in one atomic step and never creates a record.
//! - [`CodeStore::delete_codes`] ignores codes that do not exist.

mod memory;
mod sqlite;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::InMemoryCodeStore;
pub use sqlite::SqliteCodeStore;

use crate::code::IdentityCode;

/// Identifier of the order item that owns a code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ItemId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A persisted identity code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRecord {
    /// Surrogate row id, assigned by the store and never reused.
    pub id: u64,

    /// The unique code.
    pub code: IdentityCode,

    /// Owning order item.
    pub item_id: ItemId,

    /// Number of successful verifications.
    pub verify_count: u64,
}

/// Aggregate figures about a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of code records.
    pub record_count: u64,

    /// Number of distinct items owning at least one code.
    pub item_count: u64,

    /// Sum of all verification counters.
    pub total_verifications: u64,

    /// Highest row id ever assigned that is still present (0 if empty).
    pub max_id: u64,
}

/// Errors reported by a [`CodeStore`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The code is already present. Expected under concurrent issuance.
    #[error("identity code {code} already exists")]
    DuplicateCode {
        /// The rejected code.
        code: IdentityCode,
    },

    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value read from or written to the store violated the schema.
    #[error("schema violation: {0}")]
    Schema(String),

    /// A store lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Returns true if this error is a uniqueness violation on the code.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateCode { .. })
    }
}

/// Storage backend for identity code records.
pub trait CodeStore: Send + Sync {
    /// Inserts a new record with a zero verification count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateCode`] if the code already exists, or
    /// another [`StoreError`] if the write cannot be committed.
    fn insert(&self, code: &IdentityCode, item_id: ItemId) -> Result<CodeRecord, StoreError>;

    /// Finds the record holding exactly `code`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn find(&self, code: &str) -> Result<Option<CodeRecord>, StoreError>;

    /// Lists the codes owned by an item, in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn codes_for_item(&self, item_id: ItemId) -> Result<Vec<IdentityCode>, StoreError>;

    /// Atomically increments the verification counter of `code` and returns
    /// the updated record, or `None` if no such code exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    fn record_verification(&self, code: &str) -> Result<Option<CodeRecord>, StoreError>;

    /// Deletes every record whose code is in `codes` and returns how many
    /// were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion cannot be committed; in that case no
    /// record is removed.
    fn delete_codes(&self, codes: &[IdentityCode]) -> Result<usize, StoreError>;

    /// Returns aggregate figures about the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn stats(&self) -> Result<StoreStats, StoreError>;
}

impl<T: CodeStore + ?Sized> CodeStore for Arc<T> {
    fn insert(&self, code: &IdentityCode, item_id: ItemId) -> Result<CodeRecord, StoreError> {
        (**self).insert(code, item_id)
    }

    fn find(&self, code: &str) -> Result<Option<CodeRecord>, StoreError> {
        (**self).find(code)
    }

    fn codes_for_item(&self, item_id: ItemId) -> Result<Vec<IdentityCode>, StoreError> {
        (**self).codes_for_item(item_id)
    }

    fn record_verification(&self, code: &str) -> Result<Option<CodeRecord>, StoreError> {
        (**self).record_verification(code)
    }

    fn delete_codes(&self, codes: &[IdentityCode]) -> Result<usize, StoreError> {
        (**self).delete_codes(codes)
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        (**self).stats()
    }
}
