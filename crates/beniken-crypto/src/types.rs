use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CryptoError, Result};

/// AES-GCM IV length in bytes (96 bits per NIST recommendation).
pub const AES_GCM_IV_LENGTH: usize = 12;

/// AES-GCM tag length in bytes (128 bits).
pub const AES_GCM_TAG_LENGTH: usize = 16;

/// AES key length in bytes (256 bits).
pub const AES_KEY_LENGTH: usize = 32;

/// Length of the HMAC key used for lookup hashes.
pub const LOOKUP_KEY_LENGTH: usize = 32;

/// Length in hex characters of `hash_value` and `lookup_hash` outputs.
pub const DIGEST_HEX_LENGTH: usize = 64;

/// Persisted form of a protected value.
///
/// All three fields are lowercase hex. The triple is only meaningful together
/// with the process key that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedField {
    pub iv: String,
    pub data: String,
    pub tag: String,
}

impl EncryptedField {
    /// Parse an untrusted stored object into an `EncryptedField`.
    ///
    /// Fails with `MalformedCiphertext` if the value is not an object or any of
    /// `iv`, `data`, `tag` is missing or not a string.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| CryptoError::malformed("expected an object with iv, data and tag"))?;

        let field = |name: &'static str| -> Result<String> {
            match obj.get(name) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(_) => Err(CryptoError::malformed(format!("{name} is not a string"))),
                None => Err(CryptoError::malformed(format!("missing {name}"))),
            }
        };

        Ok(Self {
            iv: field("iv")?,
            data: field("data")?,
            tag: field("tag")?,
        })
    }
}

/// A PII field as stored on a record.
///
/// The variant is fixed when the record is written; readers match on it
/// instead of probing the stored shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredFieldValue", into = "StoredFieldValue")]
pub enum FieldValue {
    Plain(String),
    Encrypted(EncryptedField),
    /// An encrypted slot whose stored triple is incomplete or mistyped.
    ///
    /// Kept verbatim so the rest of the record stays readable and rewriting
    /// it does not destroy the evidence. Revealing it fails with
    /// `MalformedCiphertext`.
    Malformed(Value),
}

impl FieldValue {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted(_))
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }

    pub fn as_encrypted(&self) -> Option<&EncryptedField> {
        match self {
            Self::Encrypted(field) => Some(field),
            Self::Plain(_) | Self::Malformed(_) => None,
        }
    }
}

impl From<EncryptedField> for FieldValue {
    fn from(field: EncryptedField) -> Self {
        Self::Encrypted(field)
    }
}

/// Wire shape of `FieldValue`: `{"plain": "..."}` or `{"encrypted": {...}}`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StoredFieldValue {
    Plain(String),
    Encrypted(Value),
}

impl From<StoredFieldValue> for FieldValue {
    fn from(stored: StoredFieldValue) -> Self {
        match stored {
            StoredFieldValue::Plain(s) => Self::Plain(s),
            StoredFieldValue::Encrypted(raw) => match EncryptedField::from_json(&raw) {
                Ok(field) => Self::Encrypted(field),
                Err(_) => Self::Malformed(raw),
            },
        }
    }
}

impl From<FieldValue> for StoredFieldValue {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Plain(s) => Self::Plain(s),
            FieldValue::Encrypted(field) => Self::Encrypted(serde_json::json!({
                "iv": field.iv,
                "data": field.data,
                "tag": field.tag,
            })),
            FieldValue::Malformed(raw) => Self::Encrypted(raw),
        }
    }
}
