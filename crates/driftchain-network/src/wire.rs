//! The wire protocol: message types, frame envelope, and frame signing.
//!
//! Every message on the wire is a [`Frame`]: a typed payload plus an
//! optional sender signature. The signature covers the SHA-256 of the
//! frame's canonical JSON encoding with the `s` (signature) field itself
//! removed, so a frame signs its own type and payload but never its own
//! signature.

use driftchain_crypto::{KeyPair, PublicKey};
use driftchain_types::codec::{canonical_bytes_excluding, sha256_hex};
use driftchain_types::error::PeerProtocolError;
use driftchain_types::{AccountName, Block};
use serde::{Deserialize, Serialize};

/// The nine message types exchanged between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    QueryNodeStatus,
    NodeStatus,
    QueryBlock,
    Block,
    NewBlock,
    BlockConfRound,
    SyncStatus,
    QueryPeerList,
    PeerList,
}

/// This node's self-reported status, exchanged during handshake and
/// queryable afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub head: u64,
    pub head_hash: String,
    pub parent_hash: String,
    /// Hash of this node's genesis block; peers with a different value can
    /// never share a chain and are rejected at handshake.
    pub origin_hash: String,
    pub version: String,
}

/// A reachable peer address, exchanged via `PEER_LIST`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerAddress {
    pub account: AccountName,
    pub ws_address: String,
}

/// A round-0 or round-1 consensus vote, gossiped as `BLOCK_CONF_ROUND`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockConfRound {
    pub height: u64,
    pub hash: String,
    pub round: u8,
    pub voter: AccountName,
    pub ts: i64,
}

/// The producer's sync status, gossiped as `STEEM_SYNC_STATUS` (named for
/// the anchor chain's own terminology).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub account: AccountName,
    pub behind_blocks: u64,
    pub ts: i64,
}

/// The payload carried by a [`Frame`], tagged so a receiver can dispatch on
/// `Frame::msg_type` without guessing which variant is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    QueryNodeStatus { challenge: String },
    NodeStatus(NodeStatus),
    QueryBlock { height: u64 },
    Block(Box<Block>),
    NewBlock(Box<Block>),
    BlockConfRound(BlockConfRound),
    SyncStatus(SyncStatus),
    QueryPeerList,
    PeerList { peers: Vec<PeerAddress> },
}

/// A signature attached to a frame: the signing account and its base58
/// compact signature over the frame's hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSignature {
    #[serde(rename = "n")]
    pub account: AccountName,
    #[serde(rename = "s")]
    pub signature: String,
}

/// The on-wire envelope: `{ "t": <type>, "d": <payload>, "s"?: { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "t")]
    pub msg_type: MessageType,
    #[serde(rename = "d")]
    pub data: Payload,
    #[serde(rename = "s", skip_serializing_if = "Option::is_none")]
    pub sig: Option<FrameSignature>,
}

impl Frame {
    /// Builds an unsigned frame.
    pub fn new(msg_type: MessageType, data: Payload) -> Self {
        Self { msg_type, data, sig: None }
    }

    /// Hashes this frame's canonical bytes with `s` excluded: the preimage
    /// both `sign` and `verify` operate over.
    fn signing_hash(&self) -> Result<[u8; 32], PeerProtocolError> {
        let bytes = canonical_bytes_excluding(self, &["s"])
            .map_err(|e| PeerProtocolError::Malformed(e.to_string()))?;
        let hex = sha256_hex(&bytes);
        hex_to_32(&hex).map_err(|_| PeerProtocolError::Malformed("bad hash hex".to_string()))
    }

    /// Signs this frame in place with `key_pair`, attaching `account` as
    /// the signer's name.
    pub fn sign(&mut self, account: &str, key_pair: &KeyPair) -> Result<(), PeerProtocolError> {
        self.sig = None;
        let hash = self.signing_hash()?;
        let signature = key_pair
            .private
            .sign(&hash)
            .map_err(|_| PeerProtocolError::Malformed("signing failed".to_string()))?;
        self.sig = Some(FrameSignature {
            account: account.to_string(),
            signature,
        });
        Ok(())
    }

    /// Verifies this frame's signature against `public_key`. Fails if the
    /// frame carries no signature at all.
    pub fn verify(&self, public_key: &PublicKey) -> Result<(), PeerProtocolError> {
        let sig = self.sig.as_ref().ok_or(PeerProtocolError::BadSignature)?;
        let mut unsigned = self.clone();
        unsigned.sig = None;
        let hash = unsigned.signing_hash()?;
        public_key
            .verify(&hash, &sig.signature)
            .map_err(|_| PeerProtocolError::BadSignature)
    }

    /// The signature string used as a gossip dedup key, if signed.
    pub fn sig_key(&self) -> Option<&str> {
        self.sig.as_ref().map(|s| s.signature.as_str())
    }
}

fn hex_to_32(hex: &str) -> Result<[u8; 32], ()> {
    if hex.len() != 64 {
        return Err(());
    }
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| ())?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let kp = KeyPair::generate();
        let mut frame = Frame::new(
            MessageType::QueryNodeStatus,
            Payload::QueryNodeStatus {
                challenge: "abc123".to_string(),
            },
        );
        frame.sign("w1", &kp).unwrap();
        frame.verify(&kp.public).unwrap();
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let kp = KeyPair::generate();
        let mut frame = Frame::new(
            MessageType::QueryNodeStatus,
            Payload::QueryNodeStatus {
                challenge: "abc123".to_string(),
            },
        );
        frame.sign("w1", &kp).unwrap();
        frame.data = Payload::QueryNodeStatus {
            challenge: "tampered".to_string(),
        };
        assert!(frame.verify(&kp.public).is_err());
    }

    #[test]
    fn unsigned_frame_fails_verification() {
        let kp = KeyPair::generate();
        let frame = Frame::new(MessageType::QueryPeerList, Payload::QueryPeerList);
        assert!(frame.verify(&kp.public).is_err());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let kp_a = KeyPair::generate();
        let kp_b = KeyPair::generate();
        let mut frame = Frame::new(MessageType::QueryPeerList, Payload::QueryPeerList);
        frame.sign("w1", &kp_a).unwrap();
        assert!(frame.verify(&kp_b.public).is_err());
    }
}
