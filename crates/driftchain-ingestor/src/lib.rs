//! Anchor-chain ingestion: pulling blocks from the external anchor chain,
//! decoding embedded custom operations into sidechain transactions, and
//! tracking how far behind the anchor tip the node currently is.

pub mod anchor;
pub mod sync;

pub use anchor::{decode_custom_operation, AnchorBlock, AnchorClient, CustomOperation};
pub use driftchain_types::error::IngestorError;
pub use sync::{EmaGauge, SyncTracker};

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    //! An in-memory [`AnchorClient`] for use by tests in this and
    //! downstream crates.
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::anchor::{AnchorBlock, AnchorClient};
    use crate::IngestorError;

    /// A canned anchor chain: blocks are pre-seeded and served back
    /// verbatim, with no network latency.
    #[derive(Default)]
    pub struct FakeAnchorClient {
        blocks: Mutex<BTreeMap<u64, AnchorBlock>>,
    }

    impl FakeAnchorClient {
        /// Builds an empty fake anchor chain.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds `block` at its own height.
        pub fn push(&self, block: AnchorBlock) {
            self.blocks.lock().insert(block.height, block);
        }
    }

    #[async_trait]
    impl AnchorClient for FakeAnchorClient {
        async fn latest_height(&self) -> Result<u64, IngestorError> {
            Ok(self.blocks.lock().keys().next_back().copied().unwrap_or(0))
        }

        async fn block_at(&self, height: u64) -> Result<Option<AnchorBlock>, IngestorError> {
            Ok(self.blocks.lock().get(&height).cloned())
        }
    }
}
