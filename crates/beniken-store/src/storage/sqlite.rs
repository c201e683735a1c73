//! SQLite storage backend.
//!
//! # Schema
//!
//! A single `records` table keyed by `(collection, id)`. `lookup_key` carries
//! a unique index per collection; `body` holds the record as JSON text.
//! Uniqueness is enforced by SQLite, so it also holds across processes that
//! share the file.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{ffi, params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

use crate::error::{Result, StoreError};

use super::traits::{BodyUpdate, StorageBackend, StoredRecord};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,
    lookup_key TEXT,
    body       TEXT NOT NULL,
    PRIMARY KEY (collection, id)
);
DROP INDEX IF EXISTS idx_records_lookup;
CREATE UNIQUE INDEX IF NOT EXISTS idx_records_lookup_key ON records (collection, lookup_key);
";

const SELECT_COLUMNS: &str = "SELECT collection, id, lookup_key, body FROM records";

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened sqlite store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        // Concurrent writers from other connections wait instead of failing.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run raw SQL against the underlying connection.
    ///
    /// Intended for maintenance scripts and tests that need to reach past the
    /// record API.
    pub fn execute_raw(&self, sql: &str, params: impl rusqlite::Params) -> Result<usize> {
        Ok(self.conn.lock().execute(sql, params)?)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<(String, String, Option<String>, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode(raw: (String, String, Option<String>, String)) -> Result<StoredRecord> {
    let (collection, id, lookup_key, body) = raw;
    Ok(StoredRecord {
        collection,
        id,
        lookup_key,
        body: serde_json::from_str(&body)?,
    })
}

/// Map constraint violations on `records` to typed store errors.
fn write_error(err: rusqlite::Error, record: &StoredRecord) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE => {
            StoreError::LookupConflict {
                collection: record.collection.clone(),
            }
        }
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            StoreError::AlreadyExists {
                collection: record.collection.clone(),
                id: record.id.clone(),
            }
        }
        _ => err.into(),
    }
}

impl StorageBackend for SqliteBackend {
    fn put(&self, record: &StoredRecord) -> Result<()> {
        let body = serde_json::to_string(&record.body)?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO records (collection, id, lookup_key, body) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(collection, id) DO UPDATE SET
                     lookup_key = excluded.lookup_key,
                     body = excluded.body",
                params![record.collection, record.id, record.lookup_key, body],
            )
            .map_err(|e| write_error(e, record))?;
        Ok(())
    }

    fn insert(&self, record: &StoredRecord) -> Result<()> {
        let body = serde_json::to_string(&record.body)?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO records (collection, id, lookup_key, body) VALUES (?1, ?2, ?3, ?4)",
                params![record.collection, record.id, record.lookup_key, body],
            )
            .map_err(|e| write_error(e, record))?;
        Ok(())
    }

    fn update(
        &self,
        collection: &str,
        id: &str,
        f: BodyUpdate<'_>,
    ) -> Result<Option<StoredRecord>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let raw = tx
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE collection = ?1 AND id = ?2"),
                params![collection, id],
                row_to_record,
            )
            .optional()?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let mut record = decode(raw)?;
        f(&mut record.body)?;
        tx.execute(
            "UPDATE records SET body = ?3 WHERE collection = ?1 AND id = ?2",
            params![collection, id, serde_json::to_string(&record.body)?],
        )?;
        tx.commit()?;
        Ok(Some(record))
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<StoredRecord>> {
        let raw = self
            .conn
            .lock()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE collection = ?1 AND id = ?2"),
                params![collection, id],
                row_to_record,
            )
            .optional()?;
        raw.map(decode).transpose()
    }

    fn find_by_lookup(&self, collection: &str, lookup_key: &str) -> Result<Option<StoredRecord>> {
        let raw = self
            .conn
            .lock()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE collection = ?1 AND lookup_key = ?2"),
                params![collection, lookup_key],
                row_to_record,
            )
            .optional()?;
        raw.map(decode).transpose()
    }

    fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let n = self.conn.lock().execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(n > 0)
    }

    fn scan(&self, collection: &str) -> Result<Vec<StoredRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE collection = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt
            .query_map(params![collection], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, key: Option<&str>, body: serde_json::Value) -> StoredRecord {
        StoredRecord {
            collection: "users".to_string(),
            id: id.to_string(),
            lookup_key: key.map(str::to_string),
            body,
        }
    }

    #[test]
    fn put_and_get() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let rec = record("u1", Some("hash"), json!({ "purchases": 1 }));
        backend.put(&rec).unwrap();
        assert_eq!(backend.get("users", "u1").unwrap(), Some(rec));
        assert_eq!(backend.get("users", "u2").unwrap(), None);
    }

    #[test]
    fn put_replaces_body_and_key() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.put(&record("u1", Some("a"), json!({ "v": 1 }))).unwrap();
        backend.put(&record("u1", Some("b"), json!({ "v": 2 }))).unwrap();

        assert!(backend.find_by_lookup("users", "a").unwrap().is_none());
        let found = backend.find_by_lookup("users", "b").unwrap().unwrap();
        assert_eq!(found.body, json!({ "v": 2 }));
        assert_eq!(backend.scan("users").unwrap().len(), 1);
    }

    #[test]
    fn scan_keeps_insertion_order() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        for id in ["c", "a", "b"] {
            backend.put(&record(id, None, json!({}))).unwrap();
        }
        let ids: Vec<_> = backend
            .scan("users")
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn delete_reports_presence() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.put(&record("u1", None, json!({}))).unwrap();
        assert!(backend.delete("users", "u1").unwrap());
        assert!(!backend.delete("users", "u1").unwrap());
    }

    #[test]
    fn lookup_key_is_unique_per_collection() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.insert(&record("u1", Some("k"), json!({}))).unwrap();

        assert!(matches!(
            backend.insert(&record("u2", Some("k"), json!({}))),
            Err(StoreError::LookupConflict { .. })
        ));
        assert!(matches!(
            backend.put(&record("u2", Some("k"), json!({}))),
            Err(StoreError::LookupConflict { .. })
        ));
        assert!(matches!(
            backend.insert(&record("u1", None, json!({}))),
            Err(StoreError::AlreadyExists { .. })
        ));

        backend.insert(&record("u3", None, json!({}))).unwrap();
        backend.insert(&record("u4", None, json!({}))).unwrap();
        let mut other = record("o1", Some("k"), json!({}));
        other.collection = "orders".to_string();
        backend.insert(&other).unwrap();
        assert_eq!(backend.scan("users").unwrap().len(), 3);
    }

    #[test]
    fn update_rewrites_body_in_place() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.put(&record("u1", Some("k"), json!({ "n": 1 }))).unwrap();

        let updated = backend
            .update("users", "u1", &mut |body: &mut serde_json::Value| {
                body["n"] = json!(2);
                Ok(())
            })
            .unwrap()
            .unwrap();
        assert_eq!(updated.body, json!({ "n": 2 }));
        assert_eq!(updated.lookup_key.as_deref(), Some("k"));
        assert_eq!(backend.get("users", "u1").unwrap().unwrap().body, json!({ "n": 2 }));

        let failed = backend.update("users", "u1", &mut |body: &mut serde_json::Value| {
            body["n"] = json!(3);
            Err(StoreError::TotalOverflow)
        });
        assert!(failed.is_err());
        assert_eq!(backend.get("users", "u1").unwrap().unwrap().body, json!({ "n": 2 }));

        assert!(backend
            .update("users", "missing", &mut |_: &mut serde_json::Value| Ok(()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn corrupt_body_is_json_error() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .execute_raw(
                "INSERT INTO records (collection, id, lookup_key, body) VALUES ('users', 'x', NULL, '{oops')",
                (),
            )
            .unwrap();
        assert!(matches!(
            backend.get("users", "x"),
            Err(StoreError::Json(_))
        ));
    }
}
