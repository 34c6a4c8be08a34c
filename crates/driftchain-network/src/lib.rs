//! P2P transport for the sidechain: wire messages, handshake, flood gossip,
//! block recovery, and peer discovery. This crate supplies the building
//! blocks (behaviour, protocol state machines); the node binary wires them
//! into its single-threaded core loop.

pub mod behaviour;
pub mod gossip;
pub mod handshake;
pub mod peers;
pub mod recovery;
pub mod wire;

pub use behaviour::{gossip_topic, DriftchainBehaviour, DriftchainBehaviourEvent, FrameCodec, QUERY_PROTOCOL};
pub use gossip::{within_clock_tolerance, GossipDedup, KEEP_HISTORY_FOR_MS};
pub use handshake::{accept_handshake_reply, generate_challenge, HandshakePolicy, HANDSHAKE_TIMEOUT};
pub use peers::{select_dial_targets, AddressBook};
pub use recovery::{RecoveryExhausted, RecoveryState};
pub use wire::{BlockConfRound, Frame, MessageType, NodeStatus, Payload, PeerAddress, SyncStatus};
