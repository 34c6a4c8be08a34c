//! Write-through document cache.
//!
//! All state-transition reads and writes go through a [`Cache`], never
//! straight to the backend. A block's execution opens one checkpoint per
//! transaction (so a failing transaction's partial writes can be discarded
//! without touching the rest of the block) and the whole block's net
//! effect is either `flush`ed to the backend on success or `rollback`ed on
//! failure.

use std::collections::HashMap;
use std::sync::Arc;

use driftchain_types::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::DocStore;

type Key = (String, String);

/// A pending write, or an explicit pending delete (`None`).
type Slot = Option<Vec<u8>>;

/// A layered overlay on top of a durable [`DocStore`]. Reads check the
/// overlay first, falling through to the backend on a miss; writes land in
/// the overlay only, until [`Cache::flush`] commits them.
pub struct Cache<S: DocStore> {
    backend: Arc<S>,
    overlay: HashMap<Key, Slot>,
    checkpoints: Vec<HashMap<Key, Slot>>,
}

impl<S: DocStore> Cache<S> {
    /// Wraps `backend` with an empty overlay.
    pub fn new(backend: Arc<S>) -> Self {
        Self {
            backend,
            overlay: HashMap::new(),
            checkpoints: Vec::new(),
        }
    }

    /// Reads raw bytes at `collection`/`id`, checking the overlay before
    /// falling through to the backend.
    pub fn get_raw(&self, collection: &str, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = (collection.to_string(), id.to_string());
        match self.overlay.get(&key) {
            Some(slot) => Ok(slot.clone()),
            None => self.backend.get(collection, id),
        }
    }

    /// Stages a write at `collection`/`id`, visible to subsequent reads
    /// within this cache but not yet durable.
    pub fn put_raw(&mut self, collection: &str, id: &str, value: Vec<u8>) {
        self.overlay
            .insert((collection.to_string(), id.to_string()), Some(value));
    }

    /// Stages a delete at `collection`/`id`.
    pub fn delete_raw(&mut self, collection: &str, id: &str) {
        self.overlay
            .insert((collection.to_string(), id.to_string()), None);
    }

    /// Lists every `(id, value)` pair under `collection`, merging staged
    /// overlay writes/deletes on top of the backend's contents.
    pub fn scan_raw(&self, collection: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let mut merged: HashMap<String, Vec<u8>> = self
            .backend
            .scan(collection)?
            .into_iter()
            .collect();
        for ((coll, id), slot) in &self.overlay {
            if coll != collection {
                continue;
            }
            match slot {
                Some(bytes) => {
                    merged.insert(id.clone(), bytes.clone());
                }
                None => {
                    merged.remove(id);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    /// Reads and deserializes a JSON document at `collection`/`id`.
    pub fn get<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>, StorageError> {
        match self.get_raw(collection, id)? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| StorageError::Fatal(format!("corrupt document: {e}")))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Serializes and stages `value` at `collection`/`id`.
    pub fn put<T: Serialize>(
        &mut self,
        collection: &str,
        id: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let bytes = driftchain_types::codec::to_bytes_canonical(value)
            .map_err(|e| StorageError::Fatal(format!("failed to encode document: {e}")))?;
        self.put_raw(collection, id, bytes);
        Ok(())
    }

    /// Pushes a new checkpoint, snapshotting the overlay as it stands now.
    /// A matching [`Cache::rollback`] restores exactly this state.
    pub fn checkpoint(&mut self) {
        self.checkpoints.push(self.overlay.clone());
    }

    /// Discards every write staged since the last [`Cache::checkpoint`],
    /// restoring the overlay to that snapshot.
    pub fn rollback(&mut self) {
        if let Some(snapshot) = self.checkpoints.pop() {
            self.overlay = snapshot;
        }
    }

    /// Accepts every write staged since the last checkpoint: pops the
    /// checkpoint without restoring it, keeping the current overlay.
    pub fn commit_checkpoint(&mut self) {
        self.checkpoints.pop();
    }

    /// The number of checkpoints currently open.
    pub fn checkpoint_depth(&self) -> usize {
        self.checkpoints.len()
    }

    /// Writes every staged overlay entry to the backend and clears the
    /// overlay and any remaining checkpoints. A partial failure midway
    /// through the backend writes is fatal: the cache may be left
    /// inconsistent with the backend and the node should not continue.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        for ((collection, id), slot) in self.overlay.drain() {
            match slot {
                Some(bytes) => self.backend.put(&collection, &id, bytes)?,
                None => self.backend.delete(&collection, &id)?,
            }
        }
        self.checkpoints.clear();
        Ok(())
    }

    /// Discards every staged write without touching the backend, as if the
    /// cache had just been constructed.
    pub fn discard_all(&mut self) {
        self.overlay.clear();
        self.checkpoints.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryDocStore;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        value: u64,
    }

    fn cache() -> Cache<InMemoryDocStore> {
        Cache::new(Arc::new(InMemoryDocStore::new()))
    }

    #[test]
    fn get_falls_through_to_backend_on_overlay_miss() {
        let backend = Arc::new(InMemoryDocStore::new());
        backend
            .put("accounts", "alice", b"{\"value\":1}".to_vec())
            .unwrap();
        let cache = Cache::new(backend);
        let doc: Option<Doc> = cache.get("accounts", "alice").unwrap();
        assert_eq!(doc, Some(Doc { value: 1 }));
    }

    #[test]
    fn checkpoint_then_rollback_discards_writes() {
        let mut cache = cache();
        cache.put("accounts", "alice", &Doc { value: 1 }).unwrap();
        cache.checkpoint();
        cache.put("accounts", "alice", &Doc { value: 2 }).unwrap();
        cache.rollback();
        let doc: Option<Doc> = cache.get("accounts", "alice").unwrap();
        assert_eq!(doc, Some(Doc { value: 1 }));
    }

    #[test]
    fn commit_checkpoint_keeps_the_writes() {
        let mut cache = cache();
        cache.checkpoint();
        cache.put("accounts", "alice", &Doc { value: 5 }).unwrap();
        cache.commit_checkpoint();
        assert_eq!(cache.checkpoint_depth(), 0);
        let doc: Option<Doc> = cache.get("accounts", "alice").unwrap();
        assert_eq!(doc, Some(Doc { value: 5 }));
    }

    #[test]
    fn flush_persists_to_backend_and_clears_overlay() {
        let backend = Arc::new(InMemoryDocStore::new());
        let mut cache = Cache::new(backend.clone());
        cache.put("accounts", "alice", &Doc { value: 9 }).unwrap();
        cache.flush().unwrap();
        let raw = backend.get("accounts", "alice").unwrap().unwrap();
        let doc: Doc = serde_json::from_slice(&raw).unwrap();
        assert_eq!(doc, Doc { value: 9 });
    }

    #[test]
    fn nested_checkpoints_roll_back_independently() {
        let mut cache = cache();
        cache.put("accounts", "alice", &Doc { value: 1 }).unwrap();
        cache.checkpoint(); // outer (block-level)
        cache.put("accounts", "alice", &Doc { value: 2 }).unwrap();
        cache.checkpoint(); // inner (tx-level)
        cache.put("accounts", "alice", &Doc { value: 3 }).unwrap();
        cache.rollback(); // undo the failing tx
        let doc: Option<Doc> = cache.get("accounts", "alice").unwrap();
        assert_eq!(doc, Some(Doc { value: 2 }));
        cache.rollback(); // undo the whole block
        let doc: Option<Doc> = cache.get("accounts", "alice").unwrap();
        assert_eq!(doc, Some(Doc { value: 1 }));
    }

    #[test]
    fn scan_merges_overlay_over_backend() {
        let backend = Arc::new(InMemoryDocStore::new());
        backend.put("accounts", "alice", b"{\"value\":1}".to_vec()).unwrap();
        backend.put("accounts", "bob", b"{\"value\":2}".to_vec()).unwrap();
        let mut cache = Cache::new(backend);
        cache.put("accounts", "carol", &Doc { value: 3 }).unwrap();
        cache.delete_raw("accounts", "bob");
        let mut ids: Vec<String> = cache
            .scan_raw("accounts")
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["alice".to_string(), "carol".to_string()]);
    }
}
