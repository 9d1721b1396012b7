//! The code registry: issuance, lookup, counting and deletion of identity
//! codes on top of a [`CodeStore`].
//!
//! # Issuance
//!
//! [`CodeRegistry::issue`] never checks whether a candidate is free before
//! inserting it. A check followed by an insert is not atomic across
//! processes; instead every candidate goes straight to
//! [`CodeStore::insert`] and a [`StoreError::DuplicateCode`] rejection
//! sends the loop around for a fresh candidate. Duplicates therefore never
//! leave this module.
//!
//! ```rust
//! use itemcode_core::registry::CodeRegistry;
//! use itemcode_core::store::{InMemoryCodeStore, ItemId};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = CodeRegistry::new(InMemoryCodeStore::new());
//!
//! let issued = registry.issue(ItemId(42), None)?;
//! assert_eq!(registry.lookup_owner(issued.code.as_str())?, Some(ItemId(42)));
//! assert_eq!(registry.increment_and_read_count(issued.code.as_str())?, Some(1));
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::code::{CodeGenerator, IdentityCode, OsCodeGenerator};
use crate::store::{CodeRecord, CodeStore, ItemId, StoreError, StoreStats};


/// A code successfully issued to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCode {
    /// Row id assigned by the store.
    pub id: u64,

    /// The issued code.
    pub code: IdentityCode,

    /// The owning item.
    pub item_id: ItemId,
}

impl From<CodeRecord> for IssuedCode {
    fn from(record: CodeRecord) -> Self {
        Self {
            id: record.id,
            code: record.code,
            item_id: record.item_id,
        }
    }
}

/// Failure to issue a code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IssueError {
    /// The insert could not be committed for a reason other than a
    /// duplicate code. No code was issued.
    #[error("failed to issue a code for item {item_id}: {source}")]
    StorageWriteFailed {
        /// Item the code was requested for.
        item_id: ItemId,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
}

/// Failure of a registry read or delete.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// A read query failed.
    #[error("failed to read identity codes: {0}")]
    StorageReadFailed(#[source] StoreError),

    /// A write (delete or counter update) could not be committed.
    #[error("failed to write identity codes: {0}")]
    StorageWriteFailed(#[source] StoreError),
}

/// Issues and resolves identity codes.
///
/// Holds no state of its own besides the store handle and the code
/// generator; any number of registries (in this process or others) may
/// share one underlying database.
pub struct CodeRegistry<S, G = OsCodeGenerator> {
    store: S,
    generator: G,
}

impl<S: CodeStore> CodeRegistry<S> {
    /// Creates a registry that generates codes from the OS CSPRNG.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self {
            store,
            generator: OsCodeGenerator,
        }
    }
}

impl<S: CodeStore, G: CodeGenerator> CodeRegistry<S, G> {
    /// Creates a registry with a custom code generator.
    #[must_use]
    pub const fn with_generator(store: S, generator: G) -> Self {
        Self { store, generator }
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Issues a new code for `item_id`.
    ///
    /// `preferred` is tried verbatim on the first attempt only; if it is
    /// already taken a generated code is used instead. Generated candidates
    /// are retried until one is accepted by the store.
    ///
    /// # Errors
    ///
    /// Returns [`IssueError::StorageWriteFailed`] if the store fails for any
    /// reason other than a duplicate code.
    pub fn issue(
        &self,
        item_id: ItemId,
        preferred: Option<&IdentityCode>,
    ) -> Result<IssuedCode, IssueError> {
        let mut candidate = preferred
            .cloned()
            .unwrap_or_else(|| self.generator.generate());
        let mut collisions = 0u32;

        loop {
            match self.store.insert(&candidate, item_id) {
                Ok(record) => {
                    if collisions > 0 {
                        debug!(%item_id, collisions, "issued code after collisions");
                    }
                    return Ok(record.into());
                },
                Err(StoreError::DuplicateCode { code }) => {
                    collisions = collisions.saturating_add(1);
                    debug!(%item_id, %code, collisions, "code already taken, drawing another");
                    candidate = self.generator.generate();
                },
                Err(source) => {
                    warn!(%item_id, error = %source, "failed to issue identity code");
                    return Err(IssueError::StorageWriteFailed { item_id, source });
                },
            }
        }
    }

    /// Returns the item owning `code`, or `None` if no record has it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StorageReadFailed`] if the lookup fails.
    pub fn lookup_owner(&self, code: &str) -> Result<Option<ItemId>, RegistryError> {
        self.store
            .find(code)
            .map(|record| record.map(|r| r.item_id))
            .map_err(RegistryError::StorageReadFailed)
    }

    /// Returns the full record for `code`, or `None` if no record has it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StorageReadFailed`] if the lookup fails.
    pub fn find(&self, code: &str) -> Result<Option<CodeRecord>, RegistryError> {
        self.store.find(code).map_err(RegistryError::StorageReadFailed)
    }

    /// Returns every code currently owned by `item_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StorageReadFailed`] if the query fails.
    pub fn codes_for_item(&self, item_id: ItemId) -> Result<BTreeSet<IdentityCode>, RegistryError> {
        self.store
            .codes_for_item(item_id)
            .map(|codes| codes.into_iter().collect())
            .map_err(RegistryError::StorageReadFailed)
    }

    /// Atomically increments the verification counter of `code` and returns
    /// the updated record, or `None` if the code does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StorageWriteFailed`] if the update fails.
    pub fn record_verification(&self, code: &str) -> Result<Option<CodeRecord>, RegistryError> {
        self.store
            .record_verification(code)
            .map_err(RegistryError::StorageWriteFailed)
    }

    /// Atomically increments the verification counter of `code` and returns
    /// the post-increment value, or `None` if the code does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StorageWriteFailed`] if the update fails.
    pub fn increment_and_read_count(&self, code: &str) -> Result<Option<u64>, RegistryError> {
        Ok(self.record_verification(code)?.map(|r| r.verify_count))
    }

    /// Deletes every record whose code is in `codes`, returning how many
    /// were removed. Codes that do not exist are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StorageWriteFailed`] if the deletion cannot
    /// be committed.
    pub fn delete_codes(&self, codes: &BTreeSet<IdentityCode>) -> Result<usize, RegistryError> {
        if codes.is_empty() {
            return Ok(0);
        }
        let codes: Vec<IdentityCode> = codes.iter().cloned().collect();
        self.store.delete_codes(&codes).map_err(|e| {
            warn!(count = codes.len(), error = %e, "failed to delete identity codes");
            RegistryError::StorageWriteFailed(e)
        })
    }

    /// Returns aggregate figures about the underlying store.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StorageReadFailed`] if the query fails.
    pub fn stats(&self) -> Result<StoreStats, RegistryError> {
        self.store.stats().map_err(RegistryError::StorageReadFailed)
    }
}
