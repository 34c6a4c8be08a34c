//! Durable key-value backends underlying the write-through cache.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use redb::{Database, ReadableTable, TableDefinition};

use driftchain_types::error::StorageError;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

/// The durable half of the write-through cache: a flat collection/id to
/// bytes mapping with no transaction semantics of its own. All atomicity
/// (checkpoints, rollback) lives one layer up in [`crate::cache::Cache`].
pub trait DocStore: Send + Sync {
    /// Reads the raw bytes stored at `collection`/`id`, if any.
    fn get(&self, collection: &str, id: &str) -> Result<Option<Vec<u8>>, StorageError>;
    /// Writes `value` at `collection`/`id`, overwriting any prior value.
    fn put(&self, collection: &str, id: &str, value: Vec<u8>) -> Result<(), StorageError>;
    /// Removes the value at `collection`/`id`, if any.
    fn delete(&self, collection: &str, id: &str) -> Result<(), StorageError>;
    /// Lists every `(id, value)` pair currently stored under `collection`.
    fn scan(&self, collection: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;
}

fn composite_key(collection: &str, id: &str) -> String {
    format!("{collection}\0{id}")
}

fn split_composite_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('\0')
}

/// A [`DocStore`] backed by an on-disk `redb` database, the same embedded
/// engine the upstream kernel's storage crate uses for its state backend.
pub struct RedbDocStore {
    db: Database,
}

impl RedbDocStore {
    /// Opens (creating if absent) a redb database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref())
            .map_err(|e| StorageError::Fatal(format!("failed to open redb database: {e}")))?;
        {
            let tx = db
                .begin_write()
                .map_err(|e| StorageError::Fatal(e.to_string()))?;
            {
                tx.open_table(TABLE)
                    .map_err(|e| StorageError::Fatal(e.to_string()))?;
            }
            tx.commit().map_err(|e| StorageError::Fatal(e.to_string()))?;
        }
        Ok(Self { db })
    }
}

impl DocStore for RedbDocStore {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = composite_key(collection, id);
        let tx = self
            .db
            .begin_read()
            .map_err(|e| StorageError::Fatal(e.to_string()))?;
        let table = tx
            .open_table(TABLE)
            .map_err(|e| StorageError::Fatal(e.to_string()))?;
        let value = table
            .get(key.as_str())
            .map_err(|e| StorageError::Fatal(e.to_string()))?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn put(&self, collection: &str, id: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let key = composite_key(collection, id);
        let tx = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Fatal(e.to_string()))?;
        {
            let mut table = tx
                .open_table(TABLE)
                .map_err(|e| StorageError::Fatal(e.to_string()))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(|e| StorageError::Fatal(e.to_string()))?;
        }
        tx.commit().map_err(|e| StorageError::Fatal(e.to_string()))
    }

    fn delete(&self, collection: &str, id: &str) -> Result<(), StorageError> {
        let key = composite_key(collection, id);
        let tx = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Fatal(e.to_string()))?;
        {
            let mut table = tx
                .open_table(TABLE)
                .map_err(|e| StorageError::Fatal(e.to_string()))?;
            table
                .remove(key.as_str())
                .map_err(|e| StorageError::Fatal(e.to_string()))?;
        }
        tx.commit().map_err(|e| StorageError::Fatal(e.to_string()))
    }

    fn scan(&self, collection: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let prefix = format!("{collection}\0");
        let tx = self
            .db
            .begin_read()
            .map_err(|e| StorageError::Fatal(e.to_string()))?;
        let table = tx
            .open_table(TABLE)
            .map_err(|e| StorageError::Fatal(e.to_string()))?;
        let mut out = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| StorageError::Fatal(e.to_string()))?
        {
            let (k, v) = entry.map_err(|e| StorageError::Fatal(e.to_string()))?;
            let key = k.value();
            if let Some(id) = key.strip_prefix(prefix.as_str()) {
                out.push((id.to_string(), v.value().to_vec()));
            }
        }
        Ok(out)
    }
}

/// An in-memory [`DocStore`], used by tests and by standalone tooling that
/// does not need durability across restarts.
#[derive(Default)]
pub struct InMemoryDocStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryDocStore {
    /// Builds an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocStore for InMemoryDocStore {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.lock().get(&composite_key(collection, id)).cloned())
    }

    fn put(&self, collection: &str, id: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.data.lock().insert(composite_key(collection, id), value);
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<(), StorageError> {
        self.data.lock().remove(&composite_key(collection, id));
        Ok(())
    }

    fn scan(&self, collection: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        Ok(self
            .data
            .lock()
            .iter()
            .filter_map(|(k, v)| {
                split_composite_key(k).and_then(|(coll, id)| {
                    if coll == collection {
                        Some((id.to_string(), v.clone()))
                    } else {
                        None
                    }
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_put_get_delete() {
        let store = InMemoryDocStore::new();
        store.put("accounts", "alice", b"one".to_vec()).unwrap();
        assert_eq!(store.get("accounts", "alice").unwrap(), Some(b"one".to_vec()));
        store.delete("accounts", "alice").unwrap();
        assert_eq!(store.get("accounts", "alice").unwrap(), None);
    }

    #[test]
    fn in_memory_store_scan_is_scoped_to_collection() {
        let store = InMemoryDocStore::new();
        store.put("accounts", "alice", b"a".to_vec()).unwrap();
        store.put("accounts", "bob", b"b".to_vec()).unwrap();
        store.put("tokens", "DRIFT", b"t".to_vec()).unwrap();
        let mut accounts = store.scan("accounts").unwrap();
        accounts.sort();
        assert_eq!(
            accounts,
            vec![("alice".to_string(), b"a".to_vec()), ("bob".to_string(), b"b".to_vec())]
        );
    }

    #[test]
    fn redb_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.redb");
        {
            let store = RedbDocStore::open(&path).unwrap();
            store.put("accounts", "alice", b"one".to_vec()).unwrap();
        }
        let reopened = RedbDocStore::open(&path).unwrap();
        assert_eq!(reopened.get("accounts", "alice").unwrap(), Some(b"one".to_vec()));
    }
}
