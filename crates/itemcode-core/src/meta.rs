//! Order item meta conventions.
//!
//! Issued codes are attached to the order item as meta entries keyed
//! `wpi_product_identity_1`, `wpi_product_identity_2`, ... When an operator
//! edits the item, the identity entries still present in its meta list are
//! the item's desired code set.

use std::collections::BTreeSet;

use tracing::warn;

use crate::code::IdentityCode;
use crate::registry::IssuedCode;

/// Prefix shared by every identity code meta key.
pub const IDENTITY_META_PREFIX: &str = "wpi_product_identity_";

/// Returns the meta key for the `index`-th code of an item (1-based).
#[must_use]
pub fn identity_meta_key(index: usize) -> String {
    format!("{IDENTITY_META_PREFIX}{index}")
}

/// Returns true if `key` names an identity code meta entry.
#[must_use]
pub fn is_identity_meta_key(key: &str) -> bool {
    key.starts_with(IDENTITY_META_PREFIX)
}

/// Numbers a batch of issued codes into `(meta key, code)` entries.
#[must_use]
pub fn meta_entries(issued: &[IssuedCode]) -> Vec<(String, IdentityCode)> {
    issued
        .iter()
        .enumerate()
        .map(|(i, issued)| (identity_meta_key(i + 1), issued.code.clone()))
        .collect()
}

/// Collects the desired code set from an item's meta entries.
///
/// Entries whose key is not an identity key are ignored. Identity entries
/// whose value is not a well-formed code are skipped with a warning.
pub fn desired_codes_from_meta<'a, I>(entries: I) -> BTreeSet<IdentityCode>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    entries
        .into_iter()
        .filter(|(key, _)| is_identity_meta_key(key))
        .filter_map(|(key, value)| match IdentityCode::parse(value) {
            Ok(code) => Some(code),
            Err(err) => {
                warn!(key, error = %err, "ignoring malformed identity code in item meta");
                None
            },
        })
        .collect()
}
