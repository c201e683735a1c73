//! AES-256-GCM encryption of individual PII fields.
//!
//! Stored shape: `{ iv: hex(12B), data: hex(ciphertext), tag: hex(16B) }`.
//! A fresh IV is drawn for every call, so the same plaintext never produces
//! the same triple twice.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;
use zeroize::Zeroizing;

use crate::config::CryptoConfig;
use crate::error::{CryptoError, Result};
use crate::types::{
    EncryptedField, FieldValue, AES_GCM_IV_LENGTH, AES_GCM_TAG_LENGTH, LOOKUP_KEY_LENGTH,
};

type HmacSha256 = Hmac<Sha256>;

/// Generate a random 12-byte IV for AES-GCM.
pub fn generate_iv() -> Result<[u8; AES_GCM_IV_LENGTH]> {
    let mut iv = [0u8; AES_GCM_IV_LENGTH];
    getrandom::getrandom(&mut iv).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(iv)
}

/// Field-level cipher bound to the process key.
///
/// Stateless apart from the key, so one instance can be shared across
/// request handlers (`Send + Sync`, cheap to clone).
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm,
    lookup_key: Zeroizing<[u8; LOOKUP_KEY_LENGTH]>,
}

impl FieldCipher {
    pub fn new(config: &CryptoConfig) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(config.encryption_key())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        Ok(Self {
            cipher,
            lookup_key: Zeroizing::new(*config.lookup_key()),
        })
    }

    /// Encrypt a UTF-8 string. Empty input is accepted.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedField> {
        let iv = generate_iv()?;
        let nonce = Nonce::from_slice(&iv);

        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        // aes-gcm appends the tag to the ciphertext
        let (data, tag) = sealed.split_at(sealed.len() - AES_GCM_TAG_LENGTH);
        Ok(EncryptedField {
            iv: hex::encode(iv),
            data: hex::encode(data),
            tag: hex::encode(tag),
        })
    }

    /// Verify and decrypt a stored triple.
    ///
    /// Shape and encoding problems surface as `MalformedCiphertext` before any
    /// cryptographic work; a tag that does not verify is `Integrity`.
    pub fn decrypt(&self, field: &EncryptedField) -> Result<String> {
        let (iv, sealed) = decode_field(field)?;
        let nonce = Nonce::from_slice(&iv);

        let plaintext = self
            .cipher
            .decrypt(nonce, sealed.as_slice())
            .map_err(|_| {
                warn!("field decryption rejected: authentication tag mismatch");
                CryptoError::Integrity
            })?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::NotUtf8)
    }

    pub fn encrypt_value(&self, plaintext: &str) -> Result<FieldValue> {
        self.encrypt(plaintext).map(FieldValue::Encrypted)
    }

    /// Recover the plaintext of a stored field, decrypting when needed.
    pub fn reveal(&self, value: &FieldValue) -> Result<String> {
        match value {
            FieldValue::Plain(s) => Ok(s.clone()),
            FieldValue::Encrypted(field) => self.decrypt(field),
            FieldValue::Malformed(raw) => {
                EncryptedField::from_json(raw).and_then(|field| self.decrypt(&field))
            }
        }
    }

    /// Keyed HMAC-SHA256 of a plaintext, hex encoded.
    ///
    /// Stable across independent encryptions of the same value, which makes it
    /// the index for equality lookups.
    pub fn lookup_hash(&self, plaintext: &str) -> String {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&*self.lookup_key)
            .expect("HMAC accepts keys of any length");
        mac.update(plaintext.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Decode an `EncryptedField` into `(iv, ciphertext || tag)`.
fn decode_field(field: &EncryptedField) -> Result<([u8; AES_GCM_IV_LENGTH], Vec<u8>)> {
    if field.iv.is_empty() {
        return Err(CryptoError::malformed("missing iv"));
    }
    if field.tag.is_empty() {
        return Err(CryptoError::malformed("missing tag"));
    }

    let iv = decode_hex("iv", &field.iv)?;
    let data = decode_hex("data", &field.data)?;
    let tag = decode_hex("tag", &field.tag)?;

    let iv: [u8; AES_GCM_IV_LENGTH] = iv.as_slice().try_into().map_err(|_| {
        CryptoError::malformed(format!(
            "iv must be {AES_GCM_IV_LENGTH} bytes, got {}",
            iv.len()
        ))
    })?;
    if tag.len() != AES_GCM_TAG_LENGTH {
        return Err(CryptoError::malformed(format!(
            "tag must be {AES_GCM_TAG_LENGTH} bytes, got {}",
            tag.len()
        )));
    }

    let mut sealed = data;
    sealed.extend_from_slice(&tag);
    Ok((iv, sealed))
}

fn decode_hex(name: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|e| CryptoError::malformed(format!("{name} is not valid hex: {e}")))
}
