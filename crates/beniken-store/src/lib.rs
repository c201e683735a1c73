//! Order and customer records for the shop, with PII encrypted at rest.
//!
//! Every customer name and email passes through a [`FieldCipher`] before it
//! reaches a [`StorageBackend`]. Users are deduplicated by the keyed email
//! hash; orders are keyed by order number.

pub mod error;
pub mod notify;
pub mod orders;
pub mod storage;
pub mod types;
pub mod users;

use std::sync::Arc;

use beniken_crypto::FieldCipher;

pub use error::{Result, StoreError};
pub use notify::{Notification, NotificationKind, Recipient, SkipReason};
pub use orders::{OrderBook, Transition};
pub use storage::memory::MemoryBackend;
#[cfg(feature = "sqlite")]
pub use storage::sqlite::SqliteBackend;
pub use storage::traits::{BodyUpdate, StorageBackend, StoredRecord};
pub use types::*;
pub use users::{PurchaseOutcome, UserDirectory};

/// Users and orders sharing one backend and one cipher.
pub struct Store<B: StorageBackend> {
    pub users: UserDirectory<B>,
    pub orders: OrderBook<B>,
}

impl<B: StorageBackend> Store<B> {
    pub fn new(backend: B, cipher: FieldCipher) -> Self {
        let backend = Arc::new(backend);
        Self {
            users: UserDirectory::new(Arc::clone(&backend), cipher.clone()),
            orders: OrderBook::new(backend, cipher),
        }
    }
}
