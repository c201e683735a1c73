use beniken_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("{collection} record not found: {id}")]
    NotFound { collection: &'static str, id: String },

    #[error("Order number already in use: {0}")]
    DuplicateOrderNumber(String),

    /// Another record in the collection already holds this lookup key.
    #[error("{collection} lookup key already in use")]
    LookupConflict { collection: String },

    #[error("{collection} record already exists: {id}")]
    AlreadyExists { collection: String, id: String },

    #[error("Invalid item {product:?}: {reason}")]
    InvalidItem { product: String, reason: &'static str },

    #[error("Order total exceeds the representable range")]
    TotalOverflow,
}

impl StoreError {
    pub(crate) fn not_found(collection: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
