//! HKDF-SHA256 derivation of the lookup-hash key.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::types::{AES_KEY_LENGTH, LOOKUP_KEY_LENGTH};

const LOOKUP_SALT: &[u8] = b"beniken-field-lookup-salt-v1";
const LOOKUP_INFO: &[u8] = b"beniken-field-lookup-hmac-v1";

/// Derive the HMAC key for lookup hashes from the field encryption key.
///
/// Used when no dedicated `LOOKUP_HASH_KEY` is configured. The result is
/// domain-separated from the cipher key, so it never doubles as an AES key.
pub fn derive_lookup_key(
    encryption_key: &[u8; AES_KEY_LENGTH],
) -> Result<Zeroizing<[u8; LOOKUP_KEY_LENGTH]>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(LOOKUP_SALT), encryption_key);
    let mut okm = Zeroizing::new([0u8; LOOKUP_KEY_LENGTH]);
    hk.expand(LOOKUP_INFO, &mut *okm)
        .map_err(|e| CryptoError::EncryptionFailed(format!("HKDF expand failed: {}", e)))?;
    Ok(okm)
}
