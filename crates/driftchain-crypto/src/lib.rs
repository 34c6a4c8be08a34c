//! Keypairs, signing and address encoding for the driftchain node.
//!
//! Witness blocks and user transactions are both authenticated the same
//! way: SHA-256 over the canonical preimage, signed with secp256k1 ECDSA
//! using RFC 6979 deterministic nonces, the signature and public key
//! base58-encoded for the wire and for storage.

use secp256k1::ecdsa::Signature as Secp256k1Signature;
use secp256k1::{Message, PublicKey as Secp256k1PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

/// Errors from key generation, signing, verification, and encoding.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A base58 string did not decode to valid bytes.
    #[error("invalid base58 encoding")]
    InvalidEncoding,
    /// Decoded bytes were not a valid secp256k1 key or signature.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
    /// Signature verification failed.
    #[error("signature verification failed")]
    VerificationFailed,
}

impl driftchain_types::ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidEncoding => "CRYPTO_INVALID_ENCODING",
            Self::InvalidKeyMaterial(_) => "CRYPTO_INVALID_KEY_MATERIAL",
            Self::VerificationFailed => "CRYPTO_VERIFICATION_FAILED",
        }
    }
}

/// A secp256k1 private key. The scalar is kept in a [`Zeroizing`] buffer, the
/// only backing store this type actually owns, so it is genuinely wiped on
/// drop; `secp256k1::SecretKey` itself keeps no stable address we could
/// zeroize from the outside. Never `Debug`/`Display` to avoid it leaking
/// into logs.
pub struct PrivateKey(Zeroizing<[u8; 32]>);

impl PrivateKey {
    /// Generates a new random private key.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let (secret, _public) = secp.generate_keypair(&mut rng);
        Self(Zeroizing::new(secret.secret_bytes()))
    }

    /// Parses a private key from raw 32-byte scalar bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret =
            SecretKey::from_slice(bytes).map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?;
        Ok(Self(Zeroizing::new(secret.secret_bytes())))
    }

    /// Rebuilds the transient `secp256k1::SecretKey` used for an actual
    /// signing operation. The scalar bytes have already been validated by
    /// whichever constructor built `self`, so this cannot fail.
    fn secret_key(&self) -> SecretKey {
        SecretKey::from_slice(&self.0[..]).expect("scalar was already validated at construction")
    }

    /// The associated public key.
    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::new();
        PublicKey(Secp256k1PublicKey::from_secret_key(&secp, &self.secret_key()))
    }

    /// Signs `message` (already hashed to 32 bytes) with RFC 6979
    /// deterministic nonce generation, returning a base58-encoded
    /// compact signature.
    pub fn sign(&self, message_hash: &[u8; 32]) -> Result<String, CryptoError> {
        let secp = Secp256k1::new();
        let msg = Message::from_digest_slice(message_hash)
            .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?;
        let sig = secp.sign_ecdsa(&msg, &self.secret_key());
        Ok(bs58::encode(sig.serialize_compact()).into_string())
    }
}

/// A secp256k1 public key, used both for account ownership and node
/// transport identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(Secp256k1PublicKey);

impl PublicKey {
    /// Parses a public key from its base58-encoded SEC1 compressed form.
    pub fn from_base58(s: &str) -> Result<Self, CryptoError> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| CryptoError::InvalidEncoding)?;
        Secp256k1PublicKey::from_slice(&bytes)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))
    }

    /// Encodes this key as base58 over its SEC1 compressed bytes.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0.serialize()).into_string()
    }

    /// Verifies `signature` (base58-encoded compact ECDSA) over
    /// `message_hash`.
    pub fn verify(&self, message_hash: &[u8; 32], signature: &str) -> Result<(), CryptoError> {
        let secp = Secp256k1::new();
        let sig_bytes = bs58::decode(signature)
            .into_vec()
            .map_err(|_| CryptoError::InvalidEncoding)?;
        let sig = Secp256k1Signature::from_compact(&sig_bytes)
            .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?;
        let msg = Message::from_digest_slice(message_hash)
            .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?;
        secp.verify_ecdsa(&msg, &sig, &self.0)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

/// A matched private/public keypair.
pub struct KeyPair {
    /// The private half. Kept to sign blocks or transactions.
    pub private: PrivateKey,
    /// The public half, safe to share and persist.
    pub public: PublicKey,
}

impl KeyPair {
    /// Generates a fresh random keypair.
    pub fn generate() -> Self {
        let private = PrivateKey::generate();
        let public = private.public_key();
        Self { private, public }
    }

    /// Rebuilds a keypair from raw private key scalar bytes.
    pub fn from_private_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let private = PrivateKey::from_bytes(bytes)?;
        let public = private.public_key();
        Ok(Self { private, public })
    }
}

/// SHA-256 digest of `bytes`, returned as the raw 32-byte array consumed by
/// [`PrivateKey::sign`] and [`PublicKey::verify`].
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// SHA-256 digest of `bytes`, hex-encoded, matching
/// [`driftchain_types::codec::sha256_hex`] so the two crates agree on what
/// a "hash" string looks like.
pub fn sha256_hex(bytes: &[u8]) -> String {
    driftchain_types::codec::sha256_hex(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let keypair = KeyPair::generate();
        let hash = sha256(b"drift");
        let sig = keypair.private.sign(&hash).unwrap();
        keypair.public.verify(&hash, &sig).unwrap();
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let keypair = KeyPair::generate();
        let hash = sha256(b"drift");
        let sig = keypair.private.sign(&hash).unwrap();
        let other_hash = sha256(b"drift2");
        assert!(keypair.public.verify(&other_hash, &sig).is_err());
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let keypair_a = KeyPair::generate();
        let keypair_b = KeyPair::generate();
        let hash = sha256(b"drift");
        let sig = keypair_a.private.sign(&hash).unwrap();
        assert!(keypair_b.public.verify(&hash, &sig).is_err());
    }

    #[test]
    fn signing_is_deterministic() {
        let keypair = KeyPair::generate();
        let hash = sha256(b"drift");
        let sig1 = keypair.private.sign(&hash).unwrap();
        let sig2 = keypair.private.sign(&hash).unwrap();
        assert_eq!(sig1, sig2);
    }

    #[test]
    fn public_key_base58_round_trips() {
        let keypair = KeyPair::generate();
        let encoded = keypair.public.to_base58();
        let decoded = PublicKey::from_base58(&encoded).unwrap();
        assert_eq!(keypair.public, decoded);
    }

    #[test]
    fn from_private_bytes_reproduces_the_same_public_key() {
        let keypair = KeyPair::generate();
        let bytes = *keypair.private.0;
        let rebuilt = KeyPair::from_private_bytes(&bytes).unwrap();
        assert_eq!(keypair.public, rebuilt.public);
    }
}
