//! Storage backend abstraction.
//!
//! Records are JSON documents grouped into collections. Each record may carry
//! one `lookup_key`, unique per collection, used for equality lookups
//! (email hash for users, order number for orders).

use serde_json::Value;

use crate::error::Result;

/// A record as handed to and returned from a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub collection: String,
    pub id: String,
    pub lookup_key: Option<String>,
    pub body: Value,
}

/// Mutation applied to a record body inside [`StorageBackend::update`].
pub type BodyUpdate<'a> = &'a mut dyn FnMut(&mut Value) -> Result<()>;

pub trait StorageBackend: Send + Sync {
    /// Insert or replace the record with the same `(collection, id)`.
    ///
    /// Fails with `LookupConflict` if a different record in the collection
    /// holds the same lookup key.
    fn put(&self, record: &StoredRecord) -> Result<()>;

    /// Insert a new record.
    ///
    /// The uniqueness check and the write are atomic: of several concurrent
    /// inserts with one lookup key, exactly one succeeds and the others get
    /// `LookupConflict`. An existing id is `AlreadyExists`.
    fn insert(&self, record: &StoredRecord) -> Result<()>;

    /// Read-modify-write a record body atomically.
    ///
    /// Returns `None` if the record does not exist. If `f` fails nothing is
    /// written.
    fn update(&self, collection: &str, id: &str, f: BodyUpdate<'_>)
        -> Result<Option<StoredRecord>>;

    fn get(&self, collection: &str, id: &str) -> Result<Option<StoredRecord>>;

    /// The record in `collection` whose lookup key equals `lookup_key`.
    fn find_by_lookup(&self, collection: &str, lookup_key: &str) -> Result<Option<StoredRecord>>;

    /// Returns `false` if nothing was deleted.
    fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    fn scan(&self, collection: &str) -> Result<Vec<StoredRecord>>;
}
