//! Content-derived secret identifiers.
//!
//! An [`Identifier`] is the deduplication key of the secret store and the
//! token embedded in redacted configuration text. Equal secrets always map to
//! equal identifiers under the same [`IdentifierScheme`].

use crate::error::{IdentError, Result};
use crate::key::KeyMaterial;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Length of an identifier in hex characters (256-bit digest).
pub const IDENTIFIER_LEN: usize = 64;

/// Deterministic hex digest of a secret value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix suitable for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self> {
        let well_formed = s.len() == IDENTIFIER_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if well_formed {
            Ok(Identifier(s.to_string()))
        } else {
            Err(IdentError::InvalidIdentifier(s.to_string()))
        }
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How identifiers are derived from secret values.
#[derive(Debug, Clone, Default)]
pub enum IdentifierScheme {
    /// Plain SHA-256 of the value.
    #[default]
    Sha256,
    /// HMAC-SHA256 of the value under a site key.
    Keyed(KeyMaterial),
}

impl IdentifierScheme {
    /// Compute the identifier of a value.
    ///
    /// Pure and deterministic. Callers reject empty values before getting here.
    pub fn identify(&self, value: &[u8]) -> Identifier {
        match self {
            IdentifierScheme::Sha256 => Identifier(hex::encode(Sha256::digest(value))),
            IdentifierScheme::Keyed(key) => Identifier(key.mac_hex(value)),
        }
    }

    /// Name used in logs and status output.
    pub fn name(&self) -> &'static str {
        match self {
            IdentifierScheme::Sha256 => "sha256",
            IdentifierScheme::Keyed(_) => "hmac-sha256",
        }
    }
}

/// Identify a value with the default (unkeyed) scheme.
pub fn identify(value: &[u8]) -> Identifier {
    IdentifierScheme::Sha256.identify(value)
}
