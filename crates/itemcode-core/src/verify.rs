//! Public verification of identity codes.
//!
//! A verification request carries one code, usually as the
//! [`VERIFY_QUERY_PARAM`] query parameter of the link encoded in an item's
//! QR code. Verifying resolves the code to its owning item and bumps its
//! counter in a single store operation, and hands the result back as a
//! value for the caller to render.

use serde::Serialize;
use url::Url;

use crate::code::{CodeGenerator, IdentityCode};
use crate::config::VerificationConfig;
use crate::registry::{CodeRegistry, RegistryError};
use crate::store::{CodeStore, ItemId};

/// Query parameter carrying the code in a verification link.
pub const VERIFY_QUERY_PARAM: &str = "wpi-verify-product-identity";

/// A successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    /// The verified code.
    pub code: IdentityCode,

    /// Item owning the code.
    pub item_id: ItemId,

    /// How many times the code has been verified, including this request.
    /// `None` when the count is not meant to be shown.
    pub verify_count: Option<u64>,
}

/// Result of a verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// The code exists.
    Verified(Verification),

    /// No record holds the code.
    NotFound {
        /// The code as it was requested.
        code: String,
    },
}

impl VerificationOutcome {
    /// Returns true if the code was found.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }
}

/// Verifies `code`: resolves its owner and increments its counter.
///
/// An unknown code is a normal [`VerificationOutcome::NotFound`] result and
/// leaves the store untouched.
///
/// # Errors
///
/// Returns [`RegistryError::StorageWriteFailed`] if the store cannot be
/// updated.
pub fn verify_code<S: CodeStore, G: CodeGenerator>(
    registry: &CodeRegistry<S, G>,
    code: &str,
    options: &VerificationConfig,
) -> Result<VerificationOutcome, RegistryError> {
    let outcome = match registry.record_verification(code)? {
        Some(record) => VerificationOutcome::Verified(Verification {
            code: record.code,
            item_id: record.item_id,
            verify_count: options.display_verify_count.then_some(record.verify_count),
        }),
        None => VerificationOutcome::NotFound {
            code: code.to_string(),
        },
    };
    Ok(outcome)
}

/// Extracts the code from a raw query string (with or without the leading
/// `?`). Returns `None` if the parameter is absent.
#[must_use]
pub fn code_from_query(query: &str) -> Option<String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == VERIFY_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// Builds the verification link for `code` under `base_url`.
///
/// Existing query parameters of the base URL are kept.
#[must_use]
pub fn verification_link(base_url: &Url, code: &IdentityCode) -> Url {
    let mut link = base_url.clone();
    link.query_pairs_mut()
        .append_pair(VERIFY_QUERY_PARAM, code.as_str());
    link
}

/// Builds the image URL of a QR code encoding `link`, rendered by the
/// external service at `service_url`.
///
/// Black modules on white, 200x200 pixels, no quiet zone, low error
/// correction.
#[must_use]
pub fn qr_image_url(service_url: &Url, link: &Url) -> Url {
    let mut image = service_url.clone();
    image
        .query_pairs_mut()
        .append_pair("color", "000000")
        .append_pair("bgcolor", "FFFFFF")
        .append_pair("qzone", "0")
        .append_pair("margin", "0")
        .append_pair("size", "200x200")
        .append_pair("ecc", "L")
        .append_pair("data", link.as_str());
    image
}
