//! Unkeyed digest over stored ciphertext.

use sha2::{Digest, Sha256};

/// SHA-256 of `data`, as 64 lowercase hex characters.
///
/// Applied to the `data` field of an [`EncryptedField`](crate::EncryptedField).
/// Because every encryption uses a fresh IV, two encryptions of the same
/// plaintext hash differently; equality lookups go through
/// [`FieldCipher::lookup_hash`](crate::FieldCipher::lookup_hash) instead.
pub fn hash_value(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}
