//! Write-through document cache and append-only block store.

pub mod backend;
pub mod block_store;
pub mod cache;

pub use backend::{DocStore, InMemoryDocStore, RedbDocStore};
pub use block_store::BlockStore;
pub use cache::Cache;
