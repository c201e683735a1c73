//! Customer and staff accounts with encrypted name and email.
//!
//! Equality lookups go through the keyed email hash, so one email maps to one
//! record no matter how many times its ciphertext is regenerated.

use std::sync::Arc;

use beniken_crypto::{FieldCipher, FieldValue};
use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::storage::traits::{StorageBackend, StoredRecord};
use crate::types::{Contact, Role, UserRecord, FREQUENT_PURCHASE_THRESHOLD, USERS};

/// Outcome of recording a purchase against an email.
#[derive(Debug, Clone)]
pub struct PurchaseOutcome {
    pub user: UserRecord,
    /// `true` if this purchase created the account.
    pub created: bool,
}

struct Identity {
    name: FieldValue,
    email: FieldValue,
    name_hash: String,
    email_hash: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_string()
}

pub struct UserDirectory<B: StorageBackend> {
    backend: Arc<B>,
    cipher: FieldCipher,
}

impl<B: StorageBackend> UserDirectory<B> {
    pub fn new(backend: Arc<B>, cipher: FieldCipher) -> Self {
        Self { backend, cipher }
    }

    pub fn get(&self, id: &str) -> Result<Option<UserRecord>> {
        self.backend
            .get(USERS, id)?
            .map(|r| serde_json::from_value(r.body).map_err(StoreError::from))
            .transpose()
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let hash = self.email_hash(email);
        self.backend
            .find_by_lookup(USERS, &hash)?
            .map(|r| serde_json::from_value(r.body).map_err(StoreError::from))
            .transpose()
    }

    /// Count a purchase for the customer with this email, creating the
    /// account on first purchase.
    ///
    /// Safe under concurrent calls: the account is created by an atomic
    /// insert keyed on the email hash, and a caller that loses that race
    /// counts its purchase against the winner's record.
    pub fn record_purchase(&self, name: &str, email: &str) -> Result<PurchaseOutcome> {
        let hash = self.email_hash(email);
        if let Some(existing) = self.backend.find_by_lookup(USERS, &hash)? {
            return self.count_purchase(&existing.id);
        }

        let mut user = self.build(name, email, Role::Customer)?;
        user.purchases = 1;
        user.is_frequent = user.purchases >= FREQUENT_PURCHASE_THRESHOLD;
        match self.backend.insert(&stored(&user)?) {
            Ok(()) => {
                debug!(user_id = %user.id, "created customer on first purchase");
                Ok(PurchaseOutcome {
                    user,
                    created: true,
                })
            }
            Err(StoreError::LookupConflict { .. }) => {
                let existing = self
                    .backend
                    .find_by_lookup(USERS, &hash)?
                    .ok_or_else(|| StoreError::not_found(USERS, user.id.clone()))?;
                self.count_purchase(&existing.id)
            }
            Err(e) => Err(e),
        }
    }

    fn count_purchase(&self, id: &str) -> Result<PurchaseOutcome> {
        let mut counted = None;
        self.backend
            .update(USERS, id, &mut |body: &mut Value| {
                let mut user: UserRecord = serde_json::from_value(body.clone())?;
                user.purchases = user.purchases.saturating_add(1);
                user.is_frequent = user.purchases >= FREQUENT_PURCHASE_THRESHOLD;
                *body = serde_json::to_value(&user)?;
                counted = Some(user);
                Ok(())
            })?
            .ok_or_else(|| StoreError::not_found(USERS, id))?;
        let user = counted.ok_or_else(|| StoreError::not_found(USERS, id))?;
        debug!(user_id = %user.id, purchases = user.purchases, "recorded purchase");
        Ok(PurchaseOutcome {
            user,
            created: false,
        })
    }

    /// Update the existing admin account or create one.
    ///
    /// Name and email are re-encrypted under fresh IVs on update.
    pub fn upsert_admin(&self, name: &str, email: &str) -> Result<UserRecord> {
        let existing = self
            .all()?
            .into_iter()
            .find(|u| u.role == Role::Admin);

        match existing {
            Some(mut admin) => {
                self.set_identity(&mut admin, name, email)?;
                self.backend.put(&stored(&admin)?)?;
                debug!(user_id = %admin.id, "updated admin account");
                Ok(admin)
            }
            None => {
                let admin = self.build(name, email, Role::Admin)?;
                self.backend.insert(&stored(&admin)?)?;
                debug!(user_id = %admin.id, "created admin account");
                Ok(admin)
            }
        }
    }

    /// Decrypt a user's name and email.
    pub fn contact(&self, user: &UserRecord) -> Result<Contact> {
        Ok(Contact {
            name: self.cipher.reveal(&user.name)?,
            email: self.cipher.reveal(&user.email)?,
        })
    }

    pub fn all(&self) -> Result<Vec<UserRecord>> {
        self.backend
            .scan(USERS)?
            .into_iter()
            .map(|r| serde_json::from_value(r.body).map_err(StoreError::from))
            .collect()
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        if !self.backend.delete(USERS, id)? {
            return Err(StoreError::not_found(USERS, id));
        }
        debug!(user_id = %id, "deleted user");
        Ok(())
    }

    fn email_hash(&self, email: &str) -> String {
        self.cipher.lookup_hash(&normalize_email(email))
    }

    fn build(&self, name: &str, email: &str, role: Role) -> Result<UserRecord> {
        let identity = self.encrypt_identity(name, email)?;
        Ok(UserRecord {
            id: Uuid::new_v4().to_string(),
            name: identity.name,
            email: identity.email,
            name_hash: identity.name_hash,
            email_hash: identity.email_hash,
            role,
            purchases: 0,
            is_frequent: false,
            created_at: Utc::now(),
        })
    }

    fn set_identity(&self, user: &mut UserRecord, name: &str, email: &str) -> Result<()> {
        let identity = self.encrypt_identity(name, email)?;
        user.name = identity.name;
        user.email = identity.email;
        user.name_hash = identity.name_hash;
        user.email_hash = identity.email_hash;
        Ok(())
    }

    fn encrypt_identity(&self, name: &str, email: &str) -> Result<Identity> {
        let name = normalize_name(name);
        let email = normalize_email(email);
        Ok(Identity {
            name: self.cipher.encrypt_value(&name)?,
            email: self.cipher.encrypt_value(&email)?,
            name_hash: self.cipher.lookup_hash(&name),
            email_hash: self.cipher.lookup_hash(&email),
        })
    }
}

fn stored(user: &UserRecord) -> Result<StoredRecord> {
    Ok(StoredRecord {
        collection: USERS.to_string(),
        id: user.id.clone(),
        lookup_key: Some(user.email_hash.clone()),
        body: serde_json::to_value(user)?,
    })
}
