//! Verification commands: `verify` and `link`.

use anyhow::{Context, Result};
use itemcode_core::verify::{code_from_query, qr_image_url, verification_link, verify_code};
use itemcode_core::{IdentityCode, VerificationOutcome};
use serde::Serialize;

use super::{Invocation, exit_codes, print_json};

/// Accepts either a query string carrying the verification parameter or a
/// bare code. Codes may themselves contain `=`, so anything without the
/// parameter is taken literally.
fn requested_code(input: &str) -> String {
    code_from_query(input).unwrap_or_else(|| input.to_string())
}

/// Verifies a code and counts the verification.
pub fn verify(invocation: &Invocation, input: &str) -> Result<u8> {
    let code = requested_code(input);
    let registry = invocation.open_registry()?;
    let outcome = verify_code(&registry, &code, &invocation.config.verification)
        .context("failed to record verification")?;

    if invocation.json {
        print_json(&outcome)?;
    } else {
        match &outcome {
            VerificationOutcome::Verified(verification) => {
                println!(
                    "Verified: code {} belongs to item {}",
                    verification.code, verification.item_id
                );
                if let Some(count) = verification.verify_count {
                    println!("This code has been verified {count} time(s)");
                }
            },
            VerificationOutcome::NotFound { code } => {
                println!("Not verified: code '{code}' is unknown");
            },
        }
    }

    if outcome.is_verified() {
        Ok(exit_codes::SUCCESS)
    } else {
        Ok(exit_codes::NOT_FOUND)
    }
}

/// Output of `itemcode link`.
#[derive(Debug, Serialize)]
struct LinkResponse {
    code: IdentityCode,
    link: String,
    qr_image: String,
}

/// Prints the verification link for an issued code and the URL of its QR
/// image.
pub fn link(invocation: &Invocation, code: &str) -> Result<u8> {
    let code = IdentityCode::parse(code).with_context(|| format!("invalid code '{code}'"))?;
    let base_url = invocation
        .config
        .verification
        .base_url()?
        .context("verification.base_url is not configured")?;
    let qr_service_url = invocation.config.verification.qr_service_url()?;

    let owner = invocation
        .open_registry()?
        .lookup_owner(code.as_str())
        .context("failed to look up code")?;
    if owner.is_none() {
        eprintln!("Code '{code}' not found");
        return Ok(exit_codes::NOT_FOUND);
    }

    let link = verification_link(&base_url, &code);
    let response = LinkResponse {
        qr_image: qr_image_url(&qr_service_url, &link).to_string(),
        link: link.to_string(),
        code,
    };
    if invocation.json {
        print_json(&response)?;
    } else {
        println!("Link:      {}", response.link);
        println!("QR image:  {}", response.qr_image);
    }
    Ok(exit_codes::SUCCESS)
}
