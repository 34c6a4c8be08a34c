//! Witness scheduling, block validation and the round-based consensus
//! engine: the three pieces that decide which block becomes the next
//! height's finalized head.

pub mod engine;
pub mod scheduler;
pub mod validator;

pub use engine::{CandidateState, ConsensusEngine, EngineAction};
pub use scheduler::{compute_schedule, rank_witnesses, seeded_shuffle, slot_for_height};
pub use validator::{check_dist_reproduces, validate_block_shape_and_authority, ValidationContext};
