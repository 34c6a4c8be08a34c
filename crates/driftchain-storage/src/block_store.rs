//! Append-only, dense-height block log.

use driftchain_types::error::StorageError;
use driftchain_types::Block;

use crate::backend::DocStore;

const COLLECTION: &str = "blocks";
const TIP_ID: &str = "__tip_height";

fn height_to_id(height: u64) -> String {
    format!("{height:020}")
}

/// Durable storage for finalized blocks, indexed densely by height: there
/// is never a gap, and [`BlockStore::append`] enforces that on write.
pub struct BlockStore<S: DocStore> {
    backend: S,
}

impl<S: DocStore> BlockStore<S> {
    /// Wraps `backend` as a block store.
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    /// The height of the most recently appended block, if any.
    pub fn tip_height(&self) -> Result<Option<u64>, StorageError> {
        match self.backend.get(COLLECTION, TIP_ID)? {
            Some(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|e| StorageError::Fatal(format!("corrupt tip marker: {e}")))?;
                let height: u64 = text
                    .parse()
                    .map_err(|e| StorageError::Fatal(format!("corrupt tip marker: {e}")))?;
                Ok(Some(height))
            }
            None => Ok(None),
        }
    }

    /// Appends `block`. Fatal if `block.height` does not immediately follow
    /// the current tip: a gap here means the node's view of the chain has
    /// already diverged and it must not keep producing or validating.
    pub fn append(&mut self, block: &Block) -> Result<(), StorageError> {
        let expected = match self.tip_height()? {
            Some(tip) => tip + 1,
            None => 0,
        };
        if block.height != expected {
            return Err(StorageError::Fatal(format!(
                "non-contiguous block append: expected height {expected}, got {}",
                block.height
            )));
        }
        let bytes = driftchain_types::codec::to_bytes_canonical(block)
            .map_err(|e| StorageError::Fatal(format!("failed to encode block: {e}")))?;
        self.backend.put(COLLECTION, &height_to_id(block.height), bytes)?;
        self.backend
            .put(COLLECTION, TIP_ID, block.height.to_string().into_bytes())?;
        Ok(())
    }

    /// Reads the block at `height`, if one has been appended.
    pub fn read_one(&self, height: u64) -> Result<Option<Block>, StorageError> {
        match self.backend.get(COLLECTION, &height_to_id(height))? {
            Some(bytes) => {
                let block = driftchain_types::codec::from_bytes_canonical(&bytes)
                    .map_err(|e| StorageError::Fatal(format!("corrupt block at {height}: {e}")))?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// Reads every block in `[start, end]`, inclusive. Returns
    /// `StorageError::NotFound` if any height in the range is missing.
    pub fn read_range(&self, start: u64, end: u64) -> Result<Vec<Block>, StorageError> {
        let mut out = Vec::new();
        for height in start..=end {
            match self.read_one(height)? {
                Some(block) => out.push(block),
                None => return Err(StorageError::NotFound(format!("block at height {height}"))),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryDocStore;
    use driftchain_types::block::SyncFlag;

    fn block(height: u64, parent_hash: &str) -> Block {
        Block {
            height,
            parent_hash: parent_hash.to_string(),
            anchor_height: 0,
            anchor_timestamp: 0,
            timestamp: height as i64 * 3000,
            transactions: vec![],
            witness: "w1".to_string(),
            missed_by: vec![],
            dist: 0,
            sync_flag: SyncFlag::normal(),
            hash: String::new(),
            signature: String::new(),
        }
    }

    #[test]
    fn append_then_read_round_trips() {
        let mut store = BlockStore::new(InMemoryDocStore::new());
        store.append(&block(0, "genesis")).unwrap();
        store.append(&block(1, "h0")).unwrap();
        assert_eq!(store.tip_height().unwrap(), Some(1));
        assert_eq!(store.read_one(0).unwrap().unwrap().parent_hash, "genesis");
        assert_eq!(store.read_one(1).unwrap().unwrap().parent_hash, "h0");
    }

    #[test]
    fn append_rejects_a_height_gap() {
        let mut store = BlockStore::new(InMemoryDocStore::new());
        store.append(&block(0, "genesis")).unwrap();
        let err = store.append(&block(2, "h1")).unwrap_err();
        assert!(matches!(err, StorageError::Fatal(_)));
    }

    #[test]
    fn read_range_fails_fast_on_a_missing_height() {
        let mut store = BlockStore::new(InMemoryDocStore::new());
        store.append(&block(0, "genesis")).unwrap();
        store.append(&block(1, "h0")).unwrap();
        assert!(store.read_range(0, 1).unwrap().len() == 2);
        assert!(matches!(
            store.read_range(0, 5).unwrap_err(),
            StorageError::NotFound(_)
        ));
    }
}
