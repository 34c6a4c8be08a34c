//! Anchor-chain client interface and custom-operation decoding.

use async_trait::async_trait;
use driftchain_types::error::IngestorError;
use driftchain_types::tx::{Transaction, TxData, TxOrigin};
use driftchain_types::AccountName;
use serde::{Deserialize, Serialize};

/// A single custom operation observed inside an anchor-chain block: an
/// opaque memo attached to a transfer on the anchor chain, attributed to
/// the anchor account that sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomOperation {
    /// The anchor-chain account that authored this operation.
    pub sender: AccountName,
    /// The raw memo payload, expected to decode as [`TxData`] JSON.
    pub payload: Vec<u8>,
}

/// One anchor-chain block's worth of data relevant to the sidechain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorBlock {
    /// The anchor chain's own height for this block.
    pub height: u64,
    /// The anchor chain's timestamp for this block, Unix millis.
    pub timestamp: i64,
    /// The anchor chain's block hash, for cross-referencing.
    pub hash: String,
    /// Custom operations embedded in this anchor block, in order.
    pub custom_operations: Vec<CustomOperation>,
}

/// A read-only client over the external anchor chain. Implementations talk
/// to whatever RPC/indexer the anchor chain exposes; the ingestor only
/// needs sequential block access.
#[async_trait]
pub trait AnchorClient: Send + Sync {
    /// The anchor chain's current tip height.
    async fn latest_height(&self) -> Result<u64, IngestorError>;
    /// Fetches the anchor block at `height`, if the anchor chain has
    /// produced one yet.
    async fn block_at(&self, height: u64) -> Result<Option<AnchorBlock>, IngestorError>;
}

/// Decodes a [`CustomOperation`]'s memo into a sidechain [`Transaction`],
/// attributing it to the anchor chain as its origin and to `timestamp` (the
/// anchor block's own timestamp, not a wall-clock read) as its ordering
/// key. Decode failures are always recoverable: the caller logs and drops
/// the operation rather than stalling ingestion.
pub fn decode_custom_operation(
    op: &CustomOperation,
    timestamp: i64,
) -> Result<Transaction, IngestorError> {
    let data: TxData =
        serde_json::from_slice(&op.payload).map_err(|e| IngestorError::DecodeFailed(e.to_string()))?;
    let mut tx = Transaction {
        data,
        sender: op.sender.clone(),
        timestamp,
        origin: TxOrigin::Anchor,
        hash: String::new(),
        signature: None,
    };
    tx.hash = tx
        .compute_hash()
        .map_err(|e| IngestorError::DecodeFailed(e.to_string()))?;
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftchain_numeric::Amount;

    #[test]
    fn decodes_a_well_formed_memo() {
        let data = TxData::CreateAccount {
            name: "alice".to_string(),
            public_key: "pub".to_string(),
        };
        let payload = serde_json::to_vec(&data).unwrap();
        let op = CustomOperation {
            sender: "anchor-alice".to_string(),
            payload,
        };
        let tx = decode_custom_operation(&op, 1_700_000_000_000).unwrap();
        assert_eq!(tx.sender, "anchor-alice");
        assert_eq!(tx.origin, TxOrigin::Anchor);
        assert!(!tx.hash.is_empty());
    }

    #[test]
    fn rejects_garbage_payloads_without_panicking() {
        let op = CustomOperation {
            sender: "anchor-alice".to_string(),
            payload: b"not json".to_vec(),
        };
        let err = decode_custom_operation(&op, 0).unwrap_err();
        assert!(matches!(err, IngestorError::DecodeFailed(_)));
    }

    #[test]
    fn round_trips_a_transfer_memo() {
        let data = TxData::Transfer {
            to: "bob".to_string(),
            token: "DRIFT".to_string(),
            amount: Amount::from(42u64),
        };
        let payload = serde_json::to_vec(&data).unwrap();
        let op = CustomOperation {
            sender: "anchor-alice".to_string(),
            payload,
        };
        let tx = decode_custom_operation(&op, 5).unwrap();
        assert_eq!(tx.data, data);
    }
}
