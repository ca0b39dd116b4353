//! DriftStore — redb-backed record persistence for kubedrift.
//!
//! A single sorted table maps hierarchical keys to opaque byte values.
//! Every `put` runs in its own durable write transaction; redb serializes
//! writers internally, so the store can be shared across tasks without
//! external locking. Prefix scans run inside a read transaction scoped to
//! the call, and the cursor is released on every exit path when it drops.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::key::Key;
use crate::tables::RECORDS;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// One key/value pair returned by a prefix scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Key,
    pub value: Vec<u8>,
}

/// Thread-safe record store backed by redb.
#[derive(Clone)]
pub struct DriftStore {
    db: Arc<Database>,
}

impl DriftStore {
    /// Open (or create) a persistent store at the given path.
    ///
    /// Fails with [`StoreError::Open`] when the path is inaccessible or the
    /// file is already held by another process.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables().map_err(|e| StoreError::Open(e.to_string()))?;
        debug!(?path, "record store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory record store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Io))?;
        txn.open_table(RECORDS).map_err(map_err!(Io))?;
        txn.commit().map_err(map_err!(Io))?;
        Ok(())
    }

    /// Write one entry, replacing any previous value under the same key.
    pub fn put(&self, key: &Key, value: &[u8]) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Io))?;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Io))?;
            table
                .insert(key.as_str(), value)
                .map_err(map_err!(Io))?;
        }
        txn.commit().map_err(map_err!(Io))?;
        debug!(%key, bytes = value.len(), "record stored");
        Ok(())
    }

    /// Serialize `value` as JSON and store it under `key`.
    pub fn put_json<T: Serialize>(&self, key: &Key, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Encode))?;
        self.put(key, &bytes)
    }

    /// Fetch the value stored under an exact key.
    pub fn get(&self, key: &Key) -> StoreResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(map_err!(Io))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Io))?;
        let value = table
            .get(key.as_str())
            .map_err(map_err!(Io))?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    /// Fetch and decode a JSON value stored under an exact key.
    pub fn get_json<T: DeserializeOwned>(&self, key: &Key) -> StoreResult<Option<T>> {
        match self.get(key)? {
            Some(bytes) => decode(key.as_str(), &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Every entry whose key starts with `prefix`, in ascending key order.
    ///
    /// An empty prefix returns the whole store.
    pub fn get_by_prefix(&self, prefix: &str) -> StoreResult<Vec<Entry>> {
        let mut entries = Vec::new();
        self.scan(prefix, |key, value| {
            entries.push(Entry {
                key: Key::from_raw(key),
                value: value.to_vec(),
            });
            Ok(())
        })?;
        debug!(%prefix, count = entries.len(), "prefix scan");
        Ok(entries)
    }

    /// Values under `prefix` concatenated in key order.
    pub fn get_by_prefix_concat(&self, prefix: &str) -> StoreResult<Vec<u8>> {
        let mut out = Vec::new();
        self.scan(prefix, |_, value| {
            out.extend_from_slice(value);
            Ok(())
        })?;
        Ok(out)
    }

    /// Decode every JSON value under `prefix`.
    ///
    /// The first value that fails to decode aborts the scan; partial
    /// results are discarded.
    pub fn scan_json<T: DeserializeOwned>(&self, prefix: &str) -> StoreResult<Vec<(Key, T)>> {
        let mut results = Vec::new();
        self.scan(prefix, |key, value| {
            let decoded = decode(key, value)?;
            results.push((Key::from_raw(key), decoded));
            Ok(())
        })?;
        Ok(results)
    }

    /// Number of stored entries.
    pub fn len(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Io))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Io))?;
        table.len().map_err(map_err!(Io))
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Release this handle. The engine closes once the last clone is gone.
    pub fn close(self) -> StoreResult<()> {
        match Arc::try_unwrap(self.db) {
            Ok(db) => {
                drop(db);
                debug!("record store closed");
            }
            Err(_) => debug!("record store handle released; other handles keep it open"),
        }
        Ok(())
    }

    /// Walk the keys under `prefix` in order, feeding each pair to `visit`.
    ///
    /// The range starts at `prefix` and stops at the first key that no
    /// longer shares it.
    fn scan<F>(&self, prefix: &str, mut visit: F) -> StoreResult<()>
    where
        F: FnMut(&str, &[u8]) -> StoreResult<()>,
    {
        let txn = self.db.begin_read().map_err(map_err!(Io))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Io))?;
        for item in table.range(prefix..).map_err(map_err!(Io))? {
            let (key, value) = item.map_err(map_err!(Io))?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            visit(key, value.value())?;
        }
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Decode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
