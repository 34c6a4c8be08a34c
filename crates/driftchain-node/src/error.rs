//! Node-level error taxonomy: wraps every subsystem's error type and
//! classifies each variant as fatal or recoverable per spec.md §7's
//! propagation policy. Fatal variants stop the main loop; the node never
//! silently retries one.

use driftchain_types::error::{
    BlockError, ConsensusError, ErrorCode, IngestorError, PeerProtocolError, StorageError,
    TransactionError,
};
use thiserror::Error;

/// Any error the main loop can observe, tagged by originating subsystem.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Config file missing, unreadable, or malformed.
    #[error("configuration error: {0}")]
    Config(String),
    /// A block failed structural/authority validation. Recoverable: logged
    /// and dropped.
    #[error(transparent)]
    Block(#[from] BlockError),
    /// A transaction failed validation or execution.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    /// The consensus engine rejected an operation.
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
    /// The persistent store failed. Always fatal.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Anchor-chain ingestion failed.
    #[error(transparent)]
    Ingestor(#[from] IngestorError),
    /// A peer sent a malformed or unauthenticated message. Always local.
    #[error(transparent)]
    Peer(#[from] PeerProtocolError),
    /// Recovery exhausted its attempt budget. Fatal: refuses to mine until
    /// peer topology changes and the node is restarted.
    #[error("recovery stalled: exceeded attempt budget")]
    RecoveryStall,
}

impl NodeError {
    /// Whether this error should stop the main loop (spec.md §7:
    /// `StorageFail`, `ExecutionDivergence`, and `RecoveryStall` are fatal;
    /// everything else is local/recoverable and only logged).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NodeError::Storage(_)
                | NodeError::Transaction(TransactionError::ExecutionDivergence(_))
                | NodeError::RecoveryStall
        )
    }
}

impl ErrorCode for NodeError {
    fn code(&self) -> &'static str {
        match self {
            NodeError::Config(_) => "NODE_CONFIG_ERROR",
            NodeError::Block(e) => e.code(),
            NodeError::Transaction(e) => e.code(),
            NodeError::Consensus(e) => e.code(),
            NodeError::Storage(e) => e.code(),
            NodeError::Ingestor(e) => e.code(),
            NodeError::Peer(e) => e.code(),
            NodeError::RecoveryStall => "NODE_RECOVERY_STALLED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_and_execution_divergence_are_fatal() {
        assert!(NodeError::Storage(StorageError::Fatal("x".to_string())).is_fatal());
        assert!(NodeError::Transaction(TransactionError::ExecutionDivergence("x".to_string())).is_fatal());
        assert!(NodeError::RecoveryStall.is_fatal());
    }

    #[test]
    fn validation_and_peer_errors_are_recoverable() {
        assert!(!NodeError::Block(BlockError::WitnessNotScheduled).is_fatal());
        assert!(!NodeError::Peer(PeerProtocolError::BadSignature).is_fatal());
        assert!(!NodeError::Transaction(TransactionError::ValidationFail("x".to_string())).is_fatal());
    }
}
