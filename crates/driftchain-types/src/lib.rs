//! Core data structures, error taxonomy and canonical codec shared by every
//! driftchain crate.
//!
//! This crate owns no behavior beyond pure functions on plain data: no
//! storage, no networking, no signing. Crates further up the stack
//! (`driftchain-crypto`, `driftchain-storage`, `driftchain-state`, ...)
//! depend on this one, never the reverse.

pub mod account;
pub mod block;
pub mod codec;
pub mod config;
pub mod error;
pub mod keys;
pub mod order;
pub mod pool;
pub mod token;
pub mod trade;
pub mod tx;
pub mod witness;

pub use account::{Account, AccountName};
pub use block::{Block, SyncFlag, SyncMode};
pub use config::{ChainParams, ParamPatch, ParamTable};
pub use error::ErrorCode;
pub use order::{Order, OrderId, OrderStatus, OrderType, Side};
pub use pool::{canonical_pool_id, LiquidityPool, LpPosition, PoolId};
pub use token::Token;
pub use trade::{Trade, TradeId, TradeSource};
pub use tx::{Transaction, TxData, TxOrigin};
pub use witness::{CommitteeRole, ScheduleEntry, WitnessInfo};
