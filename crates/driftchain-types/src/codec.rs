//! Canonical on-wire and on-disk encoding.
//!
//! Every hashed or persisted structure in the node is encoded the same way:
//! JSON with object keys in ASCII-ascending order and no insignificant
//! whitespace. `serde_json`'s `Map` is BTreeMap-backed whenever the
//! `preserve_order` feature is off (it is, across this workspace), so plain
//! `serde_json::to_value` already yields sorted keys at every nesting level;
//! `to_bytes_canonical` only has to turn that into compact bytes.

use crate::error::CodecError;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Encodes `value` as canonical bytes: sorted-key, whitespace-free JSON.
pub fn to_bytes_canonical<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let v = serde_json::to_value(value).map_err(|e| CodecError::Json(e.to_string()))?;
    serde_json::to_vec(&v).map_err(|e| CodecError::Json(e.to_string()))
}

/// Decodes canonical bytes back into `T`.
pub fn from_bytes_canonical<T: serde::de::DeserializeOwned>(
    bytes: &[u8],
) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Json(e.to_string()))
}

/// Encodes `value` as canonical bytes with the given top-level object keys
/// removed first. Used to build the hash preimage for a structure that
/// carries its own hash and/or signature as fields of itself (`Block`,
/// `Transaction`): those fields are cleared from the preimage, never from
/// the persisted value.
pub fn canonical_bytes_excluding<T: Serialize>(
    value: &T,
    exclude_keys: &[&str],
) -> Result<Vec<u8>, CodecError> {
    let mut v = serde_json::to_value(value).map_err(|e| CodecError::Json(e.to_string()))?;
    if let Value::Object(map) = &mut v {
        for key in exclude_keys {
            map.remove(*key);
        }
    }
    serde_json::to_vec(&v).map_err(|e| CodecError::Json(e.to_string()))
}

/// SHA-256 over canonical bytes, used throughout as the hashing primitive
/// for block and transaction identity.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex_encode(&digest)
}

/// Lower-case hex encoding without external dependencies beyond `sha2`.
pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Sample {
        zeta: u32,
        alpha: u32,
        nested: Nested,
    }

    #[derive(Serialize)]
    struct Nested {
        z: u8,
        a: u8,
    }

    #[test]
    fn keys_are_sorted_at_every_nesting_level() {
        let s = Sample {
            zeta: 1,
            alpha: 2,
            nested: Nested { z: 9, a: 8 },
        };
        let bytes = to_bytes_canonical(&s).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, r#"{"alpha":2,"nested":{"a":8,"z":9},"zeta":1}"#);
    }

    #[test]
    fn excluded_keys_are_removed_from_the_preimage_only() {
        let s = Sample {
            zeta: 1,
            alpha: 2,
            nested: Nested { z: 9, a: 8 },
        };
        let preimage = canonical_bytes_excluding(&s, &["zeta"]).unwrap();
        let text = String::from_utf8(preimage).unwrap();
        assert_eq!(text, r#"{"alpha":2,"nested":{"a":8,"z":9}}"#);

        // The original encode (no exclusion) still carries every field.
        let full = to_bytes_canonical(&s).unwrap();
        assert!(String::from_utf8(full).unwrap().contains("zeta"));
    }

    #[test]
    fn sha256_hex_is_stable_and_64_chars() {
        let h1 = sha256_hex(b"driftchain");
        let h2 = sha256_hex(b"driftchain");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }
}
