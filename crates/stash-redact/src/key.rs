//! Key material for keyed identifiers.
//!
//! A keyed identifier is HMAC-SHA256 over the secret. Identifiers end up in
//! archived configuration text, so with a key in place nobody holding only the
//! archive can confirm a guessed password by hashing it.

use crate::error::{IdentError, Result};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::path::Path;

/// Schema version written into key files.
pub const KEY_FILE_SCHEMA_VERSION: &str = "1.0.0";

const KEY_ALGORITHM: &str = "hmac-sha256";

/// Key material for HMAC-SHA256.
#[derive(Clone)]
pub struct KeyMaterial {
    key: [u8; 32],
}

impl KeyMaterial {
    /// Create new key material with a random key.
    pub fn generate() -> Result<Self> {
        let mut key = [0u8; 32];
        getrandom::getrandom(&mut key).map_err(|e| {
            IdentError::KeyError(format!("failed to generate random key: {}", e))
        })?;
        Ok(Self { key })
    }

    /// Create key material from raw bytes.
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Create key material from a base64-encoded string.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| IdentError::KeyError(format!("invalid base64: {}", e)))?;

        if decoded.len() != 32 {
            return Err(IdentError::KeyError(format!(
                "key must be 32 bytes, got {}",
                decoded.len()
            )));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&decoded);
        Ok(Self { key })
    }

    /// Export key material as base64.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.key)
    }

    /// Compute HMAC-SHA256 of the input as lowercase hex.
    pub fn mac_hex(&self, input: &[u8]) -> String {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(input);
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial").finish_non_exhaustive()
    }
}

/// On-disk key file.
#[derive(Debug, Serialize, Deserialize)]
pub struct KeyFile {
    /// Schema version for the key file.
    pub schema_version: String,
    /// When this key was created.
    pub created_at: String,
    /// Algorithm (always hmac-sha256).
    pub algorithm: String,
    /// Base64-encoded key material.
    pub key_material: String,
}

impl KeyFile {
    /// Create a key file holding freshly generated key material.
    pub fn generate() -> Result<Self> {
        let key = KeyMaterial::generate()?;
        Ok(Self {
            schema_version: KEY_FILE_SCHEMA_VERSION.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            algorithm: KEY_ALGORITHM.to_string(),
            key_material: key.to_base64(),
        })
    }

    /// Load a key file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: KeyFile = serde_json::from_str(&content)?;
        if file.algorithm != KEY_ALGORITHM {
            return Err(IdentError::KeyError(format!(
                "unsupported key algorithm '{}'",
                file.algorithm
            )));
        }
        Ok(file)
    }

    /// Save the key file with restricted permissions.
    ///
    /// On Unix the file is created with mode 0600 so it is never readable by
    /// other users, even briefly. An existing file is not overwritten.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;

            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(&path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        #[cfg(not(unix))]
        {
            use std::io::Write;

            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        Ok(())
    }

    /// Decode the key material.
    pub fn material(&self) -> Result<KeyMaterial> {
        KeyMaterial::from_base64(&self.key_material)
    }
}
