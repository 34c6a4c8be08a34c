//! Core error taxonomy for the driftchain node.
//!
//! Mirrors the upstream kernel's split of errors by subsystem, each with a
//! stable `.code()` string suitable for metrics/log correlation. Propagation
//! policy (spec §7): `ValidationFail`/`PeerProtocolError`-shaped variants are
//! local and recoverable; everything else either self-heals through an FSM
//! or is fatal. Fatal variants are never silently retried.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors from the canonical codec (hashing/serialization).
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON (de)serialization failed.
    #[error("codec error: {0}")]
    Json(String),
}

impl ErrorCode for CodecError {
    fn code(&self) -> &'static str {
        "CODEC_ERROR"
    }
}

/// Errors related to block shape, hashing, and structural validation.
#[derive(Debug, Error)]
pub enum BlockError {
    /// The block's height did not follow its parent.
    #[error("invalid block height: expected {expected}, got {got}")]
    InvalidHeight {
        /// The expected height (`parent.height + 1`).
        expected: u64,
        /// The height actually present on the block.
        got: u64,
    },
    /// The block's `parent_hash` did not match any known recent head.
    #[error("mismatched parent hash: expected one of {expected:?}, got {got}")]
    MismatchedParentHash {
        /// The accepted parent hashes (local head, or a recent alternative head).
        expected: Vec<String>,
        /// The parent hash on the block.
        got: String,
    },
    /// The block's inter-block delay was shorter than `expected_min_delay`.
    #[error("block arrived too early: delta {delta_ms}ms < minimum {min_ms}ms")]
    TooEarly {
        /// Observed delta between this block's timestamp and its parent's.
        delta_ms: i64,
        /// Minimum delay required given witness priority and sync mode.
        min_ms: i64,
    },
    /// The block's timestamp is further in the future than `max_drift` allows.
    #[error("block timestamp too far in the future: {timestamp}, now {now}")]
    TimestampDrift {
        /// The block's claimed timestamp.
        timestamp: i64,
        /// The local clock at validation time.
        now: i64,
    },
    /// The witness is not present in the current shuffle for this height.
    #[error("witness not scheduled for this height")]
    WitnessNotScheduled,
    /// Two blocks at the same height were signed by the same witness with
    /// different hashes (equivocation).
    #[error("equivocation detected: witness {witness} signed two blocks at height {height}")]
    Equivocation {
        /// The offending witness's account name.
        witness: String,
        /// The height at which the equivocation was observed.
        height: u64,
    },
    /// The recomputed hash did not match `block.hash`.
    #[error("hash mismatch: expected {expected}, got {got}")]
    HashMismatch {
        /// The recomputed canonical hash.
        expected: String,
        /// The hash claimed on the block.
        got: String,
    },
    /// The signature did not verify against the witness's registered key.
    #[error("invalid block signature")]
    InvalidSignature,
    /// Re-executing the block's transactions did not reproduce `block.dist`.
    #[error("dist mismatch: expected {expected}, got {got}")]
    DistMismatch {
        /// The `dist` value recorded on the block.
        expected: u128,
        /// The `dist` value computed from re-execution.
        got: u128,
    },
    /// A generic shape/structural violation (field count, empty strings, etc).
    #[error("invalid block shape: {0}")]
    Shape(String),
    /// The block carries more transactions than `max_tx_per_block` allows.
    #[error("too many transactions: {got} exceeds the maximum of {max}")]
    TooManyTransactions {
        /// The configured maximum.
        max: usize,
        /// The number of transactions actually present.
        got: usize,
    },
}

impl ErrorCode for BlockError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidHeight { .. } => "BLOCK_INVALID_HEIGHT",
            Self::MismatchedParentHash { .. } => "BLOCK_MISMATCHED_PARENT_HASH",
            Self::TooEarly { .. } => "BLOCK_TOO_EARLY",
            Self::TimestampDrift { .. } => "BLOCK_TIMESTAMP_DRIFT",
            Self::WitnessNotScheduled => "BLOCK_WITNESS_NOT_SCHEDULED",
            Self::Equivocation { .. } => "BLOCK_EQUIVOCATION",
            Self::HashMismatch { .. } => "BLOCK_HASH_MISMATCH",
            Self::InvalidSignature => "BLOCK_INVALID_SIGNATURE",
            Self::DistMismatch { .. } => "BLOCK_DIST_MISMATCH",
            Self::Shape(_) => "BLOCK_SHAPE_INVALID",
            Self::TooManyTransactions { .. } => "BLOCK_TOO_MANY_TRANSACTIONS",
        }
    }
}

/// Errors from transaction validation and execution (spec §7 taxonomy).
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The transaction failed validation before any state change (recoverable).
    #[error("validation failed: {0}")]
    ValidationFail(String),
    /// A transaction approved by consensus failed during execution (fatal).
    #[error("execution divergence: {0}")]
    ExecutionDivergence(String),
    /// The sender's balance was insufficient for the requested operation.
    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance {
        /// The sender's current balance.
        have: String,
        /// The amount required.
        need: String,
    },
    /// The referenced account does not exist and could not be auto-upserted.
    #[error("unknown account: {0}")]
    UnknownAccount(String),
    /// The referenced token does not exist.
    #[error("unknown token: {0}")]
    UnknownToken(String),
    /// The referenced liquidity pool does not exist.
    #[error("unknown pool: {0}")]
    UnknownPool(String),
    /// The referenced order does not exist or is not cancellable/fillable.
    #[error("unknown or terminal order: {0}")]
    UnknownOrder(String),
    /// A numeric operation overflowed or divided by zero.
    #[error("numeric error: {0}")]
    Numeric(#[from] driftchain_numeric::NumericError),
    /// Slippage protection rejected the realized output.
    #[error("slippage exceeded: wanted at least {min_out}, got {realized}")]
    SlippageExceeded {
        /// The minimum acceptable output.
        min_out: String,
        /// The output that would have been realized.
        realized: String,
    },
}

impl ErrorCode for TransactionError {
    fn code(&self) -> &'static str {
        match self {
            Self::ValidationFail(_) => "TX_VALIDATION_FAILED",
            Self::ExecutionDivergence(_) => "TX_EXECUTION_DIVERGENCE",
            Self::InsufficientBalance { .. } => "TX_INSUFFICIENT_BALANCE",
            Self::UnknownAccount(_) => "TX_UNKNOWN_ACCOUNT",
            Self::UnknownToken(_) => "TX_UNKNOWN_TOKEN",
            Self::UnknownPool(_) => "TX_UNKNOWN_POOL",
            Self::UnknownOrder(_) => "TX_UNKNOWN_ORDER",
            Self::Numeric(_) => "TX_NUMERIC_ERROR",
            Self::SlippageExceeded { .. } => "TX_SLIPPAGE_EXCEEDED",
        }
    }
}

/// Errors from the consensus engine.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// A proposed block failed validation.
    #[error("block verification failed: {0}")]
    BlockVerificationFailed(String),
    /// The producer of a block was not the expected leader for its slot.
    #[error("invalid leader: expected {expected}, got {got}")]
    InvalidLeader {
        /// The account name of the witness expected to lead.
        expected: String,
        /// The account name of the witness that actually produced the block.
        got: String,
    },
    /// No candidate reached threshold within the block window.
    #[error("consensus timeout at height {height}")]
    Timeout {
        /// The height that timed out.
        height: u64,
    },
    /// A required dependency (schedule entry, committee roster) was missing.
    #[error("consensus dependency not found: {0}")]
    DependencyNotFound(String),
    /// A signature on a consensus vote message was invalid.
    #[error("invalid signature in consensus message")]
    InvalidSignature,
}

impl ErrorCode for ConsensusError {
    fn code(&self) -> &'static str {
        match self {
            Self::BlockVerificationFailed(_) => "CONSENSUS_BLOCK_VERIFICATION_FAILED",
            Self::InvalidLeader { .. } => "CONSENSUS_INVALID_LEADER",
            Self::Timeout { .. } => "CONSENSUS_TIMEOUT",
            Self::DependencyNotFound(_) => "CONSENSUS_DEPENDENCY_NOT_FOUND",
            Self::InvalidSignature => "CONSENSUS_INVALID_SIGNATURE",
        }
    }
}

/// Errors from the persistent store / write-through cache / block store.
///
/// `Fatal` variants correspond to spec §7's `StorageFail`: the node shuts
/// down rather than risk divergence.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested key/collection was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// A non-contiguous height was appended to the block store, or a flush
    /// failed after consensus had already approved the block.
    #[error("fatal storage error: {0}")]
    Fatal(String),
    /// The backend rejected the operation for a non-fatal reason (e.g. a
    /// caller-level precondition failed before anything was staged).
    #[error("storage precondition failed: {0}")]
    Precondition(String),
}

impl ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "STORAGE_NOT_FOUND",
            Self::Fatal(_) => "STORAGE_FATAL",
            Self::Precondition(_) => "STORAGE_PRECONDITION_FAILED",
        }
    }
}

/// Errors from the anchor-chain ingestor and sync-mode FSM.
#[derive(Debug, Error)]
pub enum IngestorError {
    /// Decoding a custom operation into a sidechain transaction failed.
    /// Always recoverable: logged and skipped, never blocks progress.
    #[error("operation decode failed: {0}")]
    DecodeFailed(String),
    /// The anchor-chain client failed to respond (transport/backoff-retried).
    #[error("anchor client error: {0}")]
    AnchorClient(String),
}

impl ErrorCode for IngestorError {
    fn code(&self) -> &'static str {
        match self {
            Self::DecodeFailed(_) => "INGESTOR_DECODE_FAILED",
            Self::AnchorClient(_) => "INGESTOR_ANCHOR_CLIENT_ERROR",
        }
    }
}

/// Errors from the P2P transport layer. Always local: closes the connection
/// without mutating global state (spec §7).
#[derive(Debug, Error)]
pub enum PeerProtocolError {
    /// A wire frame could not be decoded.
    #[error("malformed message: {0}")]
    Malformed(String),
    /// A signature on a wire message did not verify.
    #[error("bad signature from peer")]
    BadSignature,
    /// The peer's `origin_hash` (genesis marker) did not match ours.
    #[error("chain identity mismatch")]
    ChainMismatch,
    /// The handshake did not complete within the allotted time.
    #[error("handshake timed out")]
    HandshakeTimeout,
    /// The peer cap was exceeded.
    #[error("peer cap exceeded")]
    PeerCapExceeded,
    /// A duplicate connection from an already-connected node id.
    #[error("duplicate connection from {0}")]
    DuplicateConnection(String),
}

impl ErrorCode for PeerProtocolError {
    fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "PEER_MALFORMED_MESSAGE",
            Self::BadSignature => "PEER_BAD_SIGNATURE",
            Self::ChainMismatch => "PEER_CHAIN_MISMATCH",
            Self::HandshakeTimeout => "PEER_HANDSHAKE_TIMEOUT",
            Self::PeerCapExceeded => "PEER_CAP_EXCEEDED",
            Self::DuplicateConnection(_) => "PEER_DUPLICATE_CONNECTION",
        }
    }
}
