//! Structural and signature validation applied before a transaction is
//! admitted to the mempool or accepted as part of a block. Validation here
//! never touches account balances or other state — that happens during
//! execution in `driftchain-state`, where it can be rolled back atomically.

use driftchain_crypto::{sha256, PublicKey};
use driftchain_types::error::TransactionError;
use driftchain_types::tx::{TxData, TxOrigin};
use driftchain_types::Transaction;

/// The public key a transaction is self-authenticating with, for the one
/// transaction kind that registers a brand new account and so cannot be
/// verified against an already-registered key. Returns `None` for every
/// other kind, meaning the caller must look up `tx.sender`'s registered key
/// in state instead.
pub fn self_contained_signing_key(tx: &Transaction) -> Option<&str> {
    match &tx.data {
        TxData::CreateAccount { public_key, .. } => Some(public_key.as_str()),
        _ => None,
    }
}

/// Checks that `tx.hash` matches the recomputed canonical hash, and that
/// mempool-origin transactions carry a signature (anchor-origin
/// transactions are authenticated by anchor-chain inclusion instead).
pub fn validate_shape(tx: &Transaction) -> Result<(), TransactionError> {
    let expected = tx
        .compute_hash()
        .map_err(|e| TransactionError::ValidationFail(format!("failed to hash transaction: {e}")))?;
    if tx.hash != expected {
        return Err(TransactionError::ValidationFail(format!(
            "hash mismatch: claimed {}, computed {expected}",
            tx.hash
        )));
    }
    if matches!(tx.origin, TxOrigin::Mempool) && tx.signature.is_none() {
        return Err(TransactionError::ValidationFail(
            "mempool transaction missing signature".to_string(),
        ));
    }
    Ok(())
}

/// Verifies `tx.signature` against `sender_public_key` (base58-encoded),
/// the caller having already looked up the sender account's registered
/// key. A no-op success for anchor-origin transactions, which carry no
/// signature by design.
pub fn verify_signature(
    tx: &Transaction,
    sender_public_key: &str,
) -> Result<(), TransactionError> {
    let signature = match (&tx.origin, &tx.signature) {
        (TxOrigin::Anchor, _) => return Ok(()),
        (TxOrigin::Mempool, Some(sig)) => sig,
        (TxOrigin::Mempool, None) => {
            return Err(TransactionError::ValidationFail(
                "mempool transaction missing signature".to_string(),
            ))
        }
    };
    let preimage = driftchain_types::codec::canonical_bytes_excluding(
        tx,
        Transaction::HASH_EXCLUDED_FIELDS,
    )
    .map_err(|e| TransactionError::ValidationFail(format!("failed to build preimage: {e}")))?;
    let digest = sha256(&preimage);
    let key = PublicKey::from_base58(sender_public_key)
        .map_err(|e| TransactionError::ValidationFail(format!("invalid sender key: {e}")))?;
    key.verify(&digest, signature)
        .map_err(|_| TransactionError::ValidationFail("signature verification failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftchain_crypto::KeyPair;
    use driftchain_numeric::Amount;
    use driftchain_types::tx::TxData;

    fn signed_tx(keypair: &KeyPair) -> Transaction {
        let mut tx = Transaction {
            data: TxData::Transfer {
                to: "bob".to_string(),
                token: "DRIFT".to_string(),
                amount: Amount::from(10u64),
            },
            sender: "alice".to_string(),
            timestamp: 1_700_000_000_000,
            origin: TxOrigin::Mempool,
            hash: String::new(),
            signature: None,
        };
        tx.hash = tx.compute_hash().unwrap();
        let preimage =
            driftchain_types::codec::canonical_bytes_excluding(&tx, Transaction::HASH_EXCLUDED_FIELDS)
                .unwrap();
        let digest = sha256(&preimage);
        tx.signature = Some(keypair.private.sign(&digest).unwrap());
        tx
    }

    #[test]
    fn validate_shape_accepts_a_well_formed_signed_tx() {
        let keypair = KeyPair::generate();
        let tx = signed_tx(&keypair);
        validate_shape(&tx).unwrap();
    }

    #[test]
    fn validate_shape_rejects_a_tampered_hash() {
        let keypair = KeyPair::generate();
        let mut tx = signed_tx(&keypair);
        tx.hash = "0".repeat(64);
        assert!(validate_shape(&tx).is_err());
    }

    #[test]
    fn validate_shape_rejects_unsigned_mempool_tx() {
        let keypair = KeyPair::generate();
        let mut tx = signed_tx(&keypair);
        tx.signature = None;
        assert!(validate_shape(&tx).is_err());
    }

    #[test]
    fn verify_signature_accepts_the_matching_key() {
        let keypair = KeyPair::generate();
        let tx = signed_tx(&keypair);
        verify_signature(&tx, &keypair.public.to_base58()).unwrap();
    }

    #[test]
    fn verify_signature_rejects_the_wrong_key() {
        let keypair = KeyPair::generate();
        let other = KeyPair::generate();
        let tx = signed_tx(&keypair);
        assert!(verify_signature(&tx, &other.public.to_base58()).is_err());
    }

    #[test]
    fn verify_signature_is_a_no_op_for_anchor_origin() {
        let mut tx = signed_tx(&KeyPair::generate());
        tx.origin = TxOrigin::Anchor;
        tx.signature = None;
        verify_signature(&tx, "irrelevant").unwrap();
    }
}
