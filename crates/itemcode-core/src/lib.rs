//! # itemcode-core
//!
//! Unique verification codes for sold order items.
//!
//! Every unit of an order item receives a code that nobody else holds. A
//! customer can later present the code (typically by scanning a QR code
//! that encodes a verification link) and learn which item it belongs to;
//! each successful verification bumps a per-code counter.
//!
//! ## Components
//!
//! - [`registry::CodeRegistry`]: issues codes, resolves their owner, counts
//!   verifications and deletes codes. Uniqueness is enforced by the store at
//!   insert time, so any number of registries may share one database.
//! - [`reconcile::Reconciler`]: brings an item's persisted codes in line
//!   with the codes an operator left on the item, and issues the initial
//!   batch for a new item.
//! - [`store::CodeStore`]: the persistence port, implemented by
//!   [`store::SqliteCodeStore`] and [`store::InMemoryCodeStore`].
//! - [`verify`] and [`meta`]: the verification request and item meta
//!   conventions used around the registry.
//!
//! ## Example
//!
//! ```rust
//! use std::collections::BTreeSet;
//!
//! use itemcode_core::{CodeRegistry, IdentityCode, ItemId, Reconciler, SqliteCodeStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = CodeRegistry::new(SqliteCodeStore::in_memory()?);
//! let reconciler = Reconciler::new(&registry);
//!
//! let batch = reconciler.issue_batch(ItemId(42), 3);
//! assert!(batch.is_complete());
//!
//! // The operator replaces the first code with one of their own.
//! let mut desired: BTreeSet<IdentityCode> =
//!     batch.issued.iter().skip(1).map(|i| i.code.clone()).collect();
//! desired.insert(IdentityCode::parse("abc123")?);
//!
//! reconciler.reconcile(ItemId(42), &desired)?;
//! assert_eq!(registry.codes_for_item(ItemId(42))?, desired);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod code;
pub mod config;
pub mod meta;
pub mod reconcile;
pub mod registry;
pub mod store;
pub mod verify;

pub use code::{CODE_LEN, CodeError, CodeGenerator, IdentityCode, OsCodeGenerator};
pub use config::{ConfigError, RegistryConfig, StoreConfig, VerificationConfig};
pub use reconcile::{BatchReport, ReconcilePlan, ReconcileReport, Reconciler, Substitution};
pub use registry::{CodeRegistry, IssueError, IssuedCode, RegistryError};
pub use store::{
    CodeRecord, CodeStore, InMemoryCodeStore, ItemId, SqliteCodeStore, StoreError, StoreStats,
};
pub use verify::{Verification, VerificationOutcome, verify_code};
