//! Identity code values and their generation.
//!
//! An [`IdentityCode`] is the token printed next to (and encoded in the QR
//! code of) a sold order item. Generated codes are exactly [`CODE_LEN`]
//! lower-case hexadecimal characters; codes entered by an operator while
//! editing an order may be shorter, so parsing accepts any 1 to [`CODE_LEN`]
//! printable ASCII characters.

use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum (and generated) length of an identity code, in characters.
pub const CODE_LEN: usize = 30;

/// Number of random bytes drawn per generated code.
const CODE_BYTES: usize = CODE_LEN / 2;

/// Errors produced when parsing an identity code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CodeError {
    /// The code is empty.
    #[error("identity code is empty")]
    Empty,

    /// The code exceeds [`CODE_LEN`] characters.
    #[error("identity code is {len} characters long (max {CODE_LEN})")]
    TooLong {
        /// Observed length in bytes.
        len: usize,
    },

    /// The code contains whitespace, control or non-ASCII characters.
    #[error("identity code contains invalid character {ch:?}")]
    InvalidCharacter {
        /// The offending character.
        ch: char,
    },
}

/// A validated identity code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityCode(String);

impl IdentityCode {
    /// Parses and validates a code.
    ///
    /// Matching is exact: no trimming or case folding is applied, because
    /// lookups against the store are case-sensitive.
    ///
    /// # Errors
    ///
    /// Returns a [`CodeError`] if the value is empty, longer than
    /// [`CODE_LEN`], or contains anything but printable ASCII.
    pub fn parse(value: impl Into<String>) -> Result<Self, CodeError> {
        let value = value.into();
        if value.is_empty() {
            return Err(CodeError::Empty);
        }
        if let Some(ch) = value.chars().find(|c| !c.is_ascii_graphic()) {
            return Err(CodeError::InvalidCharacter { ch });
        }
        if value.len() > CODE_LEN {
            return Err(CodeError::TooLong { len: value.len() });
        }
        Ok(Self(value))
    }

    /// Wraps a value read back from the store, which only ever holds codes
    /// that passed [`IdentityCode::parse`] on the way in.
    pub(crate) const fn from_stored(value: String) -> Self {
        Self(value)
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the code, returning the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for IdentityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdentityCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for IdentityCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for IdentityCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for IdentityCode {
    type Error = CodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<IdentityCode> for String {
    fn from(code: IdentityCode) -> Self {
        code.0
    }
}

/// Source of fresh candidate codes.
///
/// Implementations must draw independent randomness for every call; the
/// registry relies on collisions being negligible by construction, not on
/// its retry loop.
pub trait CodeGenerator: Send + Sync {
    /// Produces a new candidate code.
    fn generate(&self) -> IdentityCode;
}

/// Generates codes from the operating system CSPRNG.
///
/// Each code is 15 freshly drawn bytes, hex-encoded to [`CODE_LEN`]
/// characters (120 bits).
#[derive(Debug, Clone, Copy, Default)]
pub struct OsCodeGenerator;

impl CodeGenerator for OsCodeGenerator {
    fn generate(&self) -> IdentityCode {
        let mut bytes = [0u8; CODE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        IdentityCode(hex::encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_generated_code_shape() {
        let code = OsCodeGenerator.generate();
        assert_eq!(code.as_str().len(), CODE_LEN);
        assert!(
            code.as_str()
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
        assert_eq!(IdentityCode::parse(code.as_str()), Ok(code));
    }

    #[test]
    fn test_generated_codes_are_distinct() {
        let codes: HashSet<_> = (0..1_000).map(|_| OsCodeGenerator.generate()).collect();
        assert_eq!(codes.len(), 1_000);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(IdentityCode::parse(""), Err(CodeError::Empty));
        assert_eq!(
            IdentityCode::parse("a".repeat(CODE_LEN + 1)),
            Err(CodeError::TooLong { len: CODE_LEN + 1 })
        );
        assert_eq!(
            IdentityCode::parse("abc 123"),
            Err(CodeError::InvalidCharacter { ch: ' ' })
        );
        assert_eq!(
            IdentityCode::parse("abc\n"),
            Err(CodeError::InvalidCharacter { ch: '\n' })
        );
        assert_eq!(
            IdentityCode::parse("café"),
            Err(CodeError::InvalidCharacter { ch: 'é' })
        );
    }

    #[test]
    fn test_parse_is_exact() {
        let upper = IdentityCode::parse("ABC123").unwrap();
        let lower = IdentityCode::parse("abc123").unwrap();
        assert_ne!(upper, lower);
        assert_eq!(upper.as_str(), "ABC123");
    }

    #[test]
    fn test_serde_validates() {
        let code: IdentityCode = code_from_toml("\"abc123\"").unwrap();
        assert_eq!(code.as_str(), "abc123");
        assert!(code_from_toml("\"\"").is_err());
    }

    fn code_from_toml(raw: &str) -> Result<IdentityCode, toml::de::Error> {
        #[derive(Deserialize)]
        struct Wrapper {
            code: IdentityCode,
        }
        toml::from_str::<Wrapper>(&format!("code = {raw}")).map(|w| w.code)
    }
}
