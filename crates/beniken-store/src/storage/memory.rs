//! In-memory `StorageBackend`, for tests and embedding.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::error::{Result, StoreError};

use super::traits::{BodyUpdate, StorageBackend, StoredRecord};

/// record id → record
type Collection = BTreeMap<String, StoredRecord>;

/// In-memory storage. Scans return records ordered by id.
///
/// Every operation runs under one lock, so check-then-write sequences inside
/// a single call are atomic.
#[derive(Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, Collection>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.records
            .lock()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

/// Whether a record other than `record` already holds its lookup key.
fn key_taken(col: &Collection, record: &StoredRecord) -> bool {
    let Some(key) = record.lookup_key.as_deref() else {
        return false;
    };
    col.values()
        .any(|r| r.id != record.id && r.lookup_key.as_deref() == Some(key))
}

fn conflict(record: &StoredRecord) -> StoreError {
    StoreError::LookupConflict {
        collection: record.collection.clone(),
    }
}

impl StorageBackend for MemoryBackend {
    fn put(&self, record: &StoredRecord) -> Result<()> {
        let mut records = self.records.lock();
        let col = records.entry(record.collection.clone()).or_default();
        if key_taken(col, record) {
            return Err(conflict(record));
        }
        col.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn insert(&self, record: &StoredRecord) -> Result<()> {
        let mut records = self.records.lock();
        let col = records.entry(record.collection.clone()).or_default();
        if col.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists {
                collection: record.collection.clone(),
                id: record.id.clone(),
            });
        }
        if key_taken(col, record) {
            return Err(conflict(record));
        }
        col.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn update(
        &self,
        collection: &str,
        id: &str,
        f: BodyUpdate<'_>,
    ) -> Result<Option<StoredRecord>> {
        let mut records = self.records.lock();
        let Some(stored) = records.get_mut(collection).and_then(|col| col.get_mut(id)) else {
            return Ok(None);
        };
        let mut body = stored.body.clone();
        f(&mut body)?;
        stored.body = body;
        Ok(Some(stored.clone()))
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<StoredRecord>> {
        Ok(self
            .records
            .lock()
            .get(collection)
            .and_then(|col| col.get(id))
            .cloned())
    }

    fn find_by_lookup(&self, collection: &str, lookup_key: &str) -> Result<Option<StoredRecord>> {
        Ok(self.records.lock().get(collection).and_then(|col| {
            col.values()
                .find(|r| r.lookup_key.as_deref() == Some(lookup_key))
                .cloned()
        }))
    }

    fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self
            .records
            .lock()
            .get_mut(collection)
            .and_then(|col| col.remove(id))
            .is_some())
    }

    fn scan(&self, collection: &str) -> Result<Vec<StoredRecord>> {
        Ok(self
            .records
            .lock()
            .get(collection)
            .map(|col| col.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::{Arc, Barrier};

    fn record(collection: &str, id: &str, key: Option<&str>) -> StoredRecord {
        StoredRecord {
            collection: collection.to_string(),
            id: id.to_string(),
            lookup_key: key.map(str::to_string),
            body: json!({ "id": id }),
        }
    }

    #[test]
    fn put_get_replace() {
        let backend = MemoryBackend::new();
        backend.put(&record("users", "u1", Some("h1"))).unwrap();
        backend.put(&record("users", "u1", Some("h2"))).unwrap();

        let got = backend.get("users", "u1").unwrap().unwrap();
        assert_eq!(got.lookup_key.as_deref(), Some("h2"));
        assert_eq!(backend.len("users"), 1);
    }

    #[test]
    fn put_rejects_key_held_by_another_record() {
        let backend = MemoryBackend::new();
        backend.put(&record("users", "a", Some("k"))).unwrap();
        assert!(matches!(
            backend.put(&record("users", "b", Some("k"))),
            Err(StoreError::LookupConflict { .. })
        ));
        assert_eq!(backend.len("users"), 1);
    }

    #[test]
    fn insert_rejects_taken_key_and_id() {
        let backend = MemoryBackend::new();
        backend.insert(&record("users", "a", Some("k"))).unwrap();
        assert!(matches!(
            backend.insert(&record("users", "b", Some("k"))),
            Err(StoreError::LookupConflict { .. })
        ));
        assert!(matches!(
            backend.insert(&record("users", "a", None)),
            Err(StoreError::AlreadyExists { .. })
        ));
        backend.insert(&record("users", "c", None)).unwrap();
        backend.insert(&record("users", "d", None)).unwrap();
        assert_eq!(backend.len("users"), 3);
    }

    #[test]
    fn concurrent_inserts_admit_one_per_key() {
        let backend = Arc::new(MemoryBackend::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let backend = Arc::clone(&backend);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    backend
                        .insert(&record("users", &format!("u{i}"), Some("same")))
                        .is_ok()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(backend.len("users"), 1);
    }

    #[test]
    fn update_applies_or_leaves_untouched() {
        let backend = MemoryBackend::new();
        backend.put(&record("users", "a", Some("k"))).unwrap();

        let updated = backend
            .update("users", "a", &mut |body: &mut Value| {
                body["n"] = json!(1);
                Ok(())
            })
            .unwrap()
            .unwrap();
        assert_eq!(updated.body, json!({ "id": "a", "n": 1 }));

        let failed = backend.update("users", "a", &mut |body: &mut Value| {
            body["n"] = json!(2);
            Err(StoreError::TotalOverflow)
        });
        assert!(failed.is_err());
        assert_eq!(backend.get("users", "a").unwrap().unwrap().body["n"], 1);

        let missing = backend
            .update("users", "zz", &mut |_: &mut Value| Ok(()))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn collections_are_isolated() {
        let backend = MemoryBackend::new();
        backend.put(&record("users", "a", Some("k"))).unwrap();
        backend.put(&record("orders", "a", Some("k"))).unwrap();

        assert!(backend.find_by_lookup("users", "k").unwrap().is_some());
        assert!(backend.delete("users", "a").unwrap());
        assert!(backend.get("orders", "a").unwrap().is_some());
    }

    #[test]
    fn find_by_lookup_ignores_unkeyed() {
        let backend = MemoryBackend::new();
        backend.put(&record("users", "a", None)).unwrap();
        backend.put(&record("users", "b", Some("k"))).unwrap();

        let found = backend.find_by_lookup("users", "k").unwrap().unwrap();
        assert_eq!(found.id, "b");
    }

    #[test]
    fn delete_missing_returns_false() {
        let backend = MemoryBackend::new();
        assert!(!backend.delete("users", "nope").unwrap());
        assert!(backend.scan("users").unwrap().is_empty());
    }
}
