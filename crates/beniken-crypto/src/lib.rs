//! Field-level encryption for customer PII.
//!
//! `FieldCipher` turns a plaintext into an `{iv, data, tag}` triple with
//! AES-256-GCM and back, and computes the keyed lookup hash used for
//! equality search. `hash_value` is the unkeyed digest over stored ciphertext.

pub mod aes_gcm;
pub mod config;
pub mod error;
pub mod hash;
pub mod hkdf;
pub mod types;

pub use aes_gcm::{generate_iv, FieldCipher};
pub use config::{generate_key_hex, CryptoConfig, ENCRYPTION_KEY_VAR, LOOKUP_HASH_KEY_VAR};
pub use error::{CryptoError, Result};
pub use hash::hash_value;
pub use types::{
    EncryptedField, FieldValue, AES_GCM_IV_LENGTH, AES_GCM_TAG_LENGTH, AES_KEY_LENGTH,
    DIGEST_HEX_LENGTH, LOOKUP_KEY_LENGTH,
};
