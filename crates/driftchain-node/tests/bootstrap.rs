//! Bootstrap and rebuild integration tests against real on-disk redb
//! stores, exercising `NodeContext` end to end rather than through its
//! individual unit-tested methods.

use std::sync::Arc;

use driftchain_crypto::KeyPair;
use driftchain_storage::RedbDocStore;
use driftchain_types::config::ParamTable;
use driftchain_types::{Account, Transaction};

#[path = "../src/cli.rs"]
mod cli;
#[path = "../src/config.rs"]
mod config;
#[path = "../src/context.rs"]
mod context;
#[path = "../src/error.rs"]
mod error;
#[path = "../src/genesis.rs"]
mod genesis;
#[path = "../src/rebuild.rs"]
mod rebuild;

use config::{GenesisWitness, NodeConfig, RecoveryConfig, SyncConfig};
use context::NodeContext;

fn test_config(chain_id: &str, witnesses: Vec<GenesisWitness>) -> NodeConfig {
    NodeConfig {
        chain_id: chain_id.to_string(),
        chain_params: ParamTable::default(),
        genesis_witnesses: witnesses,
        recovery: RecoveryConfig::default(),
        sync: SyncConfig::default(),
    }
}

fn open_backends(dir: &std::path::Path) -> (Arc<RedbDocStore>, RedbDocStore) {
    let state = Arc::new(RedbDocStore::open(dir.join("state.redb")).unwrap());
    let blocks = RedbDocStore::open(dir.join("blocks.redb")).unwrap();
    (state, blocks)
}

#[test]
fn bootstrap_seeds_genesis_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let kp = KeyPair::generate();
    let config = test_config(
        "driftchain-test-1",
        vec![GenesisWitness {
            account: "w1".to_string(),
            public_key: kp.public.to_base58(),
            network_address: "ws://w1:9944".to_string(),
            vote_weight: 100,
        }],
    );

    let (state, blocks) = open_backends(dir.path());
    let ctx = NodeContext::bootstrap(
        config.clone(),
        "w1".to_string(),
        kp,
        KeyPair::generate(),
        Arc::clone(&state),
        blocks,
        1_000,
        64,
        &[],
    )
    .unwrap();
    assert_eq!(ctx.block_store.tip_height().unwrap(), Some(0));

    // Re-bootstrapping against the same backends must not duplicate genesis.
    let (state2, blocks2) = open_backends(dir.path());
    let ctx2 = NodeContext::bootstrap(
        config,
        "w1".to_string(),
        KeyPair::generate(),
        KeyPair::generate(),
        state2,
        blocks2,
        1_000,
        64,
        &[],
    )
    .unwrap();
    assert_eq!(ctx2.block_store.tip_height().unwrap(), Some(0));
}

#[test]
fn rebuild_replays_every_block_and_reproduces_account_state() {
    let dir = tempfile::tempdir().unwrap();
    let kp = KeyPair::generate();
    let config = test_config(
        "driftchain-test-2",
        vec![GenesisWitness {
            account: "w1".to_string(),
            public_key: kp.public.to_base58(),
            network_address: "ws://w1:9944".to_string(),
            vote_weight: 100,
        }],
    );

    let (state, blocks) = open_backends(dir.path());
    let mut ctx = NodeContext::bootstrap(
        config.clone(),
        "w1".to_string(),
        kp,
        KeyPair::generate(),
        Arc::clone(&state),
        blocks,
        1_000,
        64,
        &[],
    )
    .unwrap();

    // Seed an account directly, then finalize a height-1 block transferring
    // from it, mirroring what a real consensus round would have applied.
    let account = Account {
        name: "alice".to_string(),
        public_key: "irrelevant-for-this-test".to_string(),
        balances: Default::default(),
        voted_witnesses: Default::default(),
        last_vote_weight: Default::default(),
        created_at: 0,
    };
    ctx.state
        .cache_mut()
        .put(driftchain_types::keys::COLLECTION_ACCOUNTS, "alice", &account)
        .unwrap();
    ctx.state.cache_mut().flush().unwrap();

    let tx = Transaction {
        data: driftchain_types::tx::TxData::CreateAccount {
            name: "bob".to_string(),
            public_key: "pub-bob".to_string(),
        },
        sender: "alice".to_string(),
        timestamp: 1,
        origin: driftchain_types::tx::TxOrigin::Anchor,
        hash: "tx1".to_string(),
        signature: None,
    };
    let dist = ctx.state.process_transaction(&tx).unwrap();
    ctx.state.cache_mut().flush().unwrap();

    let parent = ctx.block_store.read_one(0).unwrap().unwrap();
    let mut block = driftchain_types::Block {
        height: 1,
        parent_hash: parent.hash.clone(),
        anchor_height: 0,
        anchor_timestamp: 0,
        timestamp: parent.timestamp + 10_000,
        transactions: vec![tx],
        witness: "w1".to_string(),
        missed_by: Vec::new(),
        dist,
        sync_flag: driftchain_types::block::SyncFlag::normal(),
        hash: String::new(),
        signature: String::new(),
    };
    block.hash = block.compute_hash().unwrap();
    ctx.block_store.append(&block).unwrap();

    // Now rebuild into a fresh state cache backed by the same blocks.
    ctx.state.cache_mut().discard_all();
    let applied = rebuild::run(&ctx.block_store, &mut ctx.state, true, 500).unwrap();
    assert_eq!(applied, 1);

    let rebuilt_bob: Option<Account> = ctx
        .state
        .cache()
        .get(driftchain_types::keys::COLLECTION_ACCOUNTS, "bob")
        .unwrap();
    assert!(rebuilt_bob.is_some());
}
