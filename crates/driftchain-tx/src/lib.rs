//! Transaction validation and mempool management for the driftchain node.

pub mod mempool;
pub mod validation;

pub use mempool::{AddResult, Mempool};
pub use validation::{self_contained_signing_key, validate_shape, verify_signature};
