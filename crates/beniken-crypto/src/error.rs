use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Missing encryption key: {var} is not set")]
    MissingKey { var: &'static str },

    #[error("Invalid key encoding in {var}: {reason}")]
    InvalidKeyEncoding { var: &'static str, reason: String },

    #[error("Invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Random number generation failed: {0}")]
    RngFailed(String),

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Integrity check failed: authentication tag does not match")]
    Integrity,

    #[error("Decrypted value is not valid UTF-8")]
    NotUtf8,
}

impl CryptoError {
    /// Startup-time configuration problem. The process should not serve traffic.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::MissingKey { .. } | Self::InvalidKeyEncoding { .. } | Self::InvalidKeyLength { .. }
        )
    }

    /// The stored value does not have the `{iv, data, tag}` shape or encoding.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedCiphertext(_))
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity)
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedCiphertext(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;
