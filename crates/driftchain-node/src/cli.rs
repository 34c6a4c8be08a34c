//! Command-line flags and the environment variables named in spec.md §6.
//! Every flag can also be supplied via the matching env var through clap's
//! `env` feature, the same pattern the upstream kernel's node binary wires.

use std::path::PathBuf;

use clap::Parser;

/// The driftchain witness node.
#[derive(Debug, Parser)]
#[command(name = "driftchain-node", about = "A driftchain witness node")]
pub struct Cli {
    /// Path to the node's TOML config file.
    #[arg(long, default_value = "node.toml")]
    pub config: PathBuf,

    /// Directory holding the redb block/document stores.
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// This node's witness account name.
    #[arg(long, env = "WITNESS_ACCOUNT")]
    pub witness_account: String,

    /// Base58-encoded witness account public key.
    #[arg(long, env = "WITNESS_PUBLIC_KEY")]
    pub witness_public_key: String,

    /// Raw hex-encoded witness account private scalar. Zeroized once parsed.
    #[arg(long, env = "WITNESS_PRIVATE_KEY")]
    pub witness_private_key: String,

    /// TCP port the P2P transport listens on.
    #[arg(long, env = "P2P_PORT", default_value_t = 9944)]
    pub p2p_port: u16,

    /// Static peer list, `account@ws://host:port`, comma-separated.
    #[arg(long, env = "PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Maximum number of simultaneously connected peers.
    #[arg(long, env = "MAX_PEERS", default_value_t = 64)]
    pub max_peers: u32,

    /// Maximum number of resting mempool transactions.
    #[arg(long, env = "MEMPOOL_SIZE", default_value_t = 50_000)]
    pub mempool_size: usize,

    /// Rebuild local state from genesis by replaying the local block store
    /// before joining consensus, instead of trusting the on-disk state.
    #[arg(long, env = "REBUILD_STATE", default_value_t = false)]
    pub rebuild_state: bool,

    /// During a rebuild, skip block signature verification (trusted replay
    /// of a block log already known to be valid).
    #[arg(long, env = "REBUILD_NO_VERIFY", default_value_t = false)]
    pub rebuild_no_verify: bool,

    /// How many replayed blocks to apply between cache flushes during a
    /// rebuild.
    #[arg(long, env = "REBUILD_WRITE_INTERVAL", default_value_t = 500)]
    pub rebuild_write_interval: u64,
}
