//! Entry point: parses CLI/env config, opens the on-disk stores, wires a
//! [`NodeContext`], optionally rebuilds state from the local block log, then
//! runs the main loop until a fatal error or shutdown signal.

mod cli;
mod config;
mod context;
mod error;
mod genesis;
mod node;
mod rebuild;

use std::sync::Arc;

use clap::Parser;
use driftchain_crypto::KeyPair;
use driftchain_storage::RedbDocStore;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::NodeConfig;
use context::NodeContext;
use error::NodeError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "node exited with a fatal error");
        return Err(e.into());
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), NodeError> {
    let config = NodeConfig::load(&cli.config)?;

    let private_key_bytes =
        hex_decode(&cli.witness_private_key).map_err(|_| NodeError::Config("malformed WITNESS_PRIVATE_KEY".to_string()))?;
    let witness_keypair = KeyPair::from_private_bytes(&private_key_bytes)
        .map_err(|e| NodeError::Config(format!("invalid witness key material: {e}")))?;
    let node_keypair = KeyPair::from_private_bytes(&private_key_bytes)
        .map_err(|e| NodeError::Config(format!("invalid witness key material: {e}")))?;
    if witness_keypair.public.to_base58() != cli.witness_public_key {
        return Err(NodeError::Config(
            "WITNESS_PUBLIC_KEY does not match the key derived from WITNESS_PRIVATE_KEY".to_string(),
        ));
    }

    std::fs::create_dir_all(&cli.data_dir)
        .map_err(|e| NodeError::Config(format!("failed to create data dir {}: {e}", cli.data_dir.display())))?;
    let state_backend = Arc::new(RedbDocStore::open(cli.data_dir.join("state.redb"))?);
    let block_backend = RedbDocStore::open(cli.data_dir.join("blocks.redb"))?;

    let mut ctx = NodeContext::bootstrap(
        config,
        cli.witness_account.clone(),
        witness_keypair,
        node_keypair,
        Arc::clone(&state_backend),
        block_backend,
        cli.mempool_size,
        cli.max_peers,
        &cli.peers,
    )?;

    if cli.rebuild_state {
        tracing::info!("REBUILD_STATE set: replaying the local block log into a fresh state cache");
        ctx.state.cache_mut().discard_all();
        let applied = rebuild::run(
            &ctx.block_store,
            &mut ctx.state,
            cli.rebuild_no_verify,
            cli.rebuild_write_interval,
        )?;
        tracing::info!(applied, "rebuild complete");
    }

    let chain_id = ctx.chain_id.clone();
    let ctx = Arc::new(Mutex::new(ctx));

    let anchor = build_anchor_client();
    let transport_identity = libp2p::identity::Keypair::generate_ed25519();

    node::run(ctx, anchor, transport_identity, cli.p2p_port, chain_id).await
}

/// Resolves the anchor-chain client. Deliberately the in-memory fake: this
/// workspace draws the line at the `AnchorClient` trait boundary and ships
/// no RPC implementation for any particular anchor chain. A deployment
/// wires its own `AnchorClient` in here in place of the fake.
fn build_anchor_client() -> Arc<dyn driftchain_ingestor::AnchorClient> {
    Arc::new(driftchain_ingestor::test_util::FakeAnchorClient::new())
}

fn hex_decode(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}
