//! Process-wide key configuration.
//!
//! Built once at startup and handed to [`FieldCipher::new`](crate::FieldCipher::new).
//! Every way of constructing a `CryptoConfig` validates the key material, so a
//! process that got a config has a usable key.

use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};
use crate::hkdf::derive_lookup_key;
use crate::types::{AES_KEY_LENGTH, LOOKUP_KEY_LENGTH};

/// Environment variable holding the hex-encoded AES-256 key.
pub const ENCRYPTION_KEY_VAR: &str = "ENCRYPTION_KEY";

/// Optional environment variable holding the hex-encoded lookup HMAC key.
pub const LOOKUP_HASH_KEY_VAR: &str = "LOOKUP_HASH_KEY";

pub struct CryptoConfig {
    encryption_key: Zeroizing<[u8; AES_KEY_LENGTH]>,
    lookup_key: Zeroizing<[u8; LOOKUP_KEY_LENGTH]>,
    lookup_key_derived: bool,
}

impl CryptoConfig {
    /// Build from raw key bytes.
    ///
    /// When `lookup_key` is `None` it is derived from `encryption_key`.
    pub fn from_keys(encryption_key: &[u8], lookup_key: Option<&[u8]>) -> Result<Self> {
        let encryption_key = to_key::<AES_KEY_LENGTH>(encryption_key)?;
        let (lookup_key, lookup_key_derived) = match lookup_key {
            Some(bytes) => (to_key::<LOOKUP_KEY_LENGTH>(bytes)?, false),
            None => (derive_lookup_key(&encryption_key)?, true),
        };
        Ok(Self {
            encryption_key,
            lookup_key,
            lookup_key_derived,
        })
    }

    /// Read `ENCRYPTION_KEY` and `LOOKUP_HASH_KEY` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read key variables through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let encryption_hex = lookup(ENCRYPTION_KEY_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or(CryptoError::MissingKey {
                var: ENCRYPTION_KEY_VAR,
            })?;
        let encryption_key = decode_hex_var(ENCRYPTION_KEY_VAR, &encryption_hex)?;

        let lookup_key = match lookup(LOOKUP_HASH_KEY_VAR).filter(|v| !v.trim().is_empty()) {
            Some(hex) => Some(decode_hex_var(LOOKUP_HASH_KEY_VAR, &hex)?),
            None => None,
        };

        let config = Self::from_keys(&encryption_key, lookup_key.as_deref().map(|k| &k[..]))?;
        debug!(
            lookup_key_derived = config.lookup_key_derived,
            "loaded field encryption config"
        );
        Ok(config)
    }

    pub(crate) fn encryption_key(&self) -> &[u8; AES_KEY_LENGTH] {
        &self.encryption_key
    }

    pub(crate) fn lookup_key(&self) -> &[u8; LOOKUP_KEY_LENGTH] {
        &self.lookup_key
    }

    /// Whether the lookup key was derived rather than configured explicitly.
    pub fn lookup_key_derived(&self) -> bool {
        self.lookup_key_derived
    }
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("encryption_key", &"[REDACTED]")
            .field("lookup_key", &"[REDACTED]")
            .field("lookup_key_derived", &self.lookup_key_derived)
            .finish()
    }
}

/// Generate a fresh random key in the `ENCRYPTION_KEY` format.
pub fn generate_key_hex() -> Result<String> {
    let mut key = Zeroizing::new([0u8; AES_KEY_LENGTH]);
    getrandom::getrandom(&mut *key).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(hex::encode(&*key))
}

fn decode_hex_var(var: &'static str, value: &str) -> Result<Zeroizing<Vec<u8>>> {
    hex::decode(value.trim())
        .map(Zeroizing::new)
        .map_err(|e| CryptoError::InvalidKeyEncoding {
            var,
            reason: e.to_string(),
        })
}

fn to_key<const N: usize>(bytes: &[u8]) -> Result<Zeroizing<[u8; N]>> {
    if bytes.len() != N {
        return Err(CryptoError::InvalidKeyLength {
            expected: N,
            got: bytes.len(),
        });
    }
    let mut key = Zeroizing::new([0u8; N]);
    key.copy_from_slice(bytes);
    Ok(key)
}
