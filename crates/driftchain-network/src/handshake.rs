//! Peer handshake: challenge-response identity verification.
//!
//! Each side issues the other a random 32-byte challenge; accepting the
//! resulting `NODE_STATUS` reply requires all of: the origin hash (genesis
//! marker) matching, the reply's signature verifying against the claimed
//! `node_id` over the exact challenge issued, no existing connection from
//! that `node_id` already, and the peer cap not being exceeded.

use std::collections::HashSet;
use std::time::Duration;

use driftchain_crypto::PublicKey;
use driftchain_types::error::PeerProtocolError;
use rand::RngCore;

use crate::wire::NodeStatus;

/// How long a handshake may remain unresolved before it is abandoned.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Generates a fresh 32-byte challenge, hex-encoded.
pub fn generate_challenge() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    driftchain_types::codec::hex_encode(&bytes)
}

/// The local side's view of chain identity and connection limits, checked
/// against an inbound handshake reply.
pub struct HandshakePolicy {
    pub local_origin_hash: String,
    pub max_peers: usize,
}

/// Validates a peer's `NODE_STATUS` handshake reply against the challenge
/// we issued, this node's chain identity, and its connection-cap/dedup
/// state. Returns the verified node id on success.
pub fn accept_handshake_reply(
    policy: &HandshakePolicy,
    connected_node_ids: &HashSet<String>,
    current_peer_count: usize,
    issued_challenge: &str,
    reply: &NodeStatus,
    reply_signature: &str,
    claimed_public_key: &PublicKey,
) -> Result<(), PeerProtocolError> {
    if reply.origin_hash != policy.local_origin_hash {
        return Err(PeerProtocolError::ChainMismatch);
    }
    if connected_node_ids.contains(&reply.node_id) {
        return Err(PeerProtocolError::DuplicateConnection(reply.node_id.clone()));
    }
    if current_peer_count >= policy.max_peers {
        return Err(PeerProtocolError::PeerCapExceeded);
    }
    let hash = hex_to_32(&sha256_hex_of(issued_challenge))
        .map_err(|_| PeerProtocolError::Malformed("bad challenge encoding".to_string()))?;
    claimed_public_key
        .verify(&hash, reply_signature)
        .map_err(|_| PeerProtocolError::BadSignature)
}

fn sha256_hex_of(s: &str) -> String {
    driftchain_types::codec::sha256_hex(s.as_bytes())
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
    use driftchain_crypto::KeyPair;

    fn status(node_id: &str, origin_hash: &str) -> NodeStatus {
        NodeStatus {
            node_id: node_id.to_string(),
            head: 10,
            head_hash: "h".to_string(),
            parent_hash: "p".to_string(),
            origin_hash: origin_hash.to_string(),
            version: "0.1.0".to_string(),
        }
    }

    fn policy() -> HandshakePolicy {
        HandshakePolicy {
            local_origin_hash: "genesis-abc".to_string(),
            max_peers: 8,
        }
    }

    #[test]
    fn rejects_mismatched_origin_hash() {
        let kp = KeyPair::generate();
        let challenge = generate_challenge();
        let hash = hex_to_32(&sha256_hex_of(&challenge)).unwrap();
        let sig = kp.private.sign(&hash).unwrap();
        let err = accept_handshake_reply(
            &policy(),
            &HashSet::new(),
            0,
            &challenge,
            &status("peer-1", "different-genesis"),
            &sig,
            &kp.public,
        )
        .unwrap_err();
        assert!(matches!(err, PeerProtocolError::ChainMismatch));
    }

    #[test]
    fn rejects_duplicate_node_id() {
        let kp = KeyPair::generate();
        let challenge = generate_challenge();
        let hash = hex_to_32(&sha256_hex_of(&challenge)).unwrap();
        let sig = kp.private.sign(&hash).unwrap();
        let mut connected = HashSet::new();
        connected.insert("peer-1".to_string());
        let err = accept_handshake_reply(
            &policy(),
            &connected,
            0,
            &challenge,
            &status("peer-1", "genesis-abc"),
            &sig,
            &kp.public,
        )
        .unwrap_err();
        assert!(matches!(err, PeerProtocolError::DuplicateConnection(_)));
    }

    #[test]
    fn rejects_when_peer_cap_exceeded() {
        let kp = KeyPair::generate();
        let challenge = generate_challenge();
        let hash = hex_to_32(&sha256_hex_of(&challenge)).unwrap();
        let sig = kp.private.sign(&hash).unwrap();
        let err = accept_handshake_reply(
            &policy(),
            &HashSet::new(),
            8,
            &challenge,
            &status("peer-1", "genesis-abc"),
            &sig,
            &kp.public,
        )
        .unwrap_err();
        assert!(matches!(err, PeerProtocolError::PeerCapExceeded));
    }

    #[test]
    fn rejects_signature_over_the_wrong_challenge() {
        let kp = KeyPair::generate();
        let issued = generate_challenge();
        let other = generate_challenge();
        let hash = hex_to_32(&sha256_hex_of(&other)).unwrap();
        let sig = kp.private.sign(&hash).unwrap();
        let err = accept_handshake_reply(
            &policy(),
            &HashSet::new(),
            0,
            &issued,
            &status("peer-1", "genesis-abc"),
            &sig,
            &kp.public,
        )
        .unwrap_err();
        assert!(matches!(err, PeerProtocolError::BadSignature));
    }

    #[test]
    fn accepts_a_well_formed_reply() {
        let kp = KeyPair::generate();
        let challenge = generate_challenge();
        let hash = hex_to_32(&sha256_hex_of(&challenge)).unwrap();
        let sig = kp.private.sign(&hash).unwrap();
        accept_handshake_reply(
            &policy(),
            &HashSet::new(),
            0,
            &challenge,
            &status("peer-1", "genesis-abc"),
            &sig,
            &kp.public,
        )
        .unwrap();
    }
}
