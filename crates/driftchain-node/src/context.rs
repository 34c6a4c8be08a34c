//! `NodeContext`: the constructor-injected dependency struct the main loop
//! drives. Grounded on the upstream kernel's `MainLoopContext`
//! (`validator/src/standard/orchestration/context.rs`), trimmed to the
//! concrete subsystems this spec actually has — no VM, no IBC, no
//! post-quantum signer, no inference runtime.

use std::collections::HashSet;
use std::sync::Arc;

use driftchain_consensus::scheduler::{compute_schedule, slot_for_height};
use driftchain_consensus::validator::{check_dist_reproduces, validate_block_shape_and_authority, ValidationContext};
use driftchain_consensus::ConsensusEngine;
use driftchain_crypto::{KeyPair, PublicKey};
use driftchain_ingestor::SyncTracker;
use driftchain_network::{AddressBook, GossipDedup, RecoveryState};
use driftchain_storage::{BlockStore, Cache, RedbDocStore};
use driftchain_tx::Mempool;
use driftchain_types::error::{BlockError, StorageError};
use driftchain_types::keys::COLLECTION_WITNESSES;
use driftchain_types::witness::WitnessInfo;
use driftchain_types::{AccountName, Block, ScheduleEntry, Transaction};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::genesis::genesis_block;

/// Everything the core loop needs wired together at startup. One
/// `NodeContext` per running node; the main loop in `node.rs` borrows it
/// mutably for the lifetime of the process.
pub struct NodeContext {
    pub config: NodeConfig,
    pub chain_id: String,
    pub genesis: Block,
    pub state: driftchain_state::StateEngine<RedbDocStore>,
    pub block_store: BlockStore<RedbDocStore>,
    pub mempool: Arc<Mempool>,
    pub consensus: ConsensusEngine,
    pub sync: SyncTracker,
    pub address_book: AddressBook,
    pub gossip: GossipDedup,
    pub recovery: Option<RecoveryState>,
    pub known_peers: HashSet<AccountName>,
    /// The configured peer cap, consulted by the handshake policy.
    pub max_peers: u32,
    /// This node's witness account name; it always votes/produces under
    /// this identity, distinct from its P2P transport identity.
    pub witness_account: AccountName,
    /// The witness account's signing keypair (block signatures).
    pub witness_keypair: KeyPair,
    /// The node's own transport-layer keypair (handshake challenges).
    pub node_keypair: KeyPair,
    /// Cached schedule for the epoch currently in effect.
    pub schedule: Vec<ScheduleEntry>,
    pub epoch_start_height: u64,
}

impl NodeContext {
    /// Opens or creates the on-disk stores under `config.data_dir` (via the
    /// caller), wires a fresh consensus engine, and seeds the genesis block
    /// if the block store is empty.
    #[allow(clippy::too_many_arguments)]
    pub fn bootstrap(
        config: NodeConfig,
        witness_account: AccountName,
        witness_keypair: KeyPair,
        node_keypair: KeyPair,
        state_backend: Arc<RedbDocStore>,
        block_backend: RedbDocStore,
        mempool_size: usize,
        max_peers: u32,
        peers: &[String],
    ) -> Result<Self, NodeError> {
        let params = config.chain_params.base.clone();
        let genesis = genesis_block(&config.chain_id)?;
        let mut block_store = BlockStore::new(block_backend);
        if block_store.tip_height()?.is_none() {
            block_store.append(&genesis)?;
        }

        let state = driftchain_state::StateEngine::new(Cache::new(state_backend), params.amm_fee_bps);
        let is_observer = !config
            .genesis_witnesses
            .iter()
            .any(|w| w.account == witness_account);
        let consensus = ConsensusEngine::new(
            params.committee_size as usize,
            is_observer,
            true,
            witness_account.clone(),
            driftchain_types::SyncMode::Normal,
        );

        Ok(Self {
            chain_id: config.chain_id.clone(),
            genesis,
            mempool: Arc::new(Mempool::with_capacity(
                config.chain_params.base.mempool_replay_window_ms,
                mempool_size,
            )),
            consensus,
            sync: SyncTracker::new(config.sync.enter_sync_lag),
            address_book: AddressBook::from_static_config(peers),
            gossip: GossipDedup::new(),
            recovery: None,
            known_peers: HashSet::new(),
            max_peers,
            witness_account,
            witness_keypair,
            node_keypair,
            schedule: Vec::new(),
            epoch_start_height: 0,
            state,
            block_store,
            config,
        })
    }

    /// Loads the active witness roster from state.
    pub fn witnesses(&self) -> Result<Vec<WitnessInfo>, StorageError> {
        let rows = self.state.cache().scan_raw(COLLECTION_WITNESSES)?;
        let mut witnesses = Vec::with_capacity(rows.len());
        for (_, bytes) in rows {
            let info: WitnessInfo = driftchain_types::codec::from_bytes_canonical(&bytes)
                .map_err(|e| StorageError::Fatal(format!("corrupt witness record: {e}")))?;
            witnesses.push(info);
        }
        Ok(witnesses)
    }

    /// Each witness account's registered signing public key, read off its
    /// `Account` document (the witness's transport address is unrelated).
    pub fn witness_keys(&self, witnesses: &[WitnessInfo]) -> Result<Vec<(String, String)>, StorageError> {
        let mut keys = Vec::with_capacity(witnesses.len());
        for w in witnesses {
            if let Some(account) = self
                .state
                .cache()
                .get::<driftchain_types::Account>(driftchain_types::keys::COLLECTION_ACCOUNTS, &w.account)?
            {
                keys.push((w.account.clone(), account.public_key));
            }
        }
        Ok(keys)
    }

    /// Recomputes the witness schedule for the epoch starting at
    /// `epoch_start_height`, seeded by the head block's hash.
    pub fn refresh_schedule(&mut self, epoch_start_height: u64, seed_hash: &str) -> Result<(), StorageError> {
        let witnesses = self.witnesses()?;
        self.schedule = compute_schedule(
            epoch_start_height,
            seed_hash,
            &witnesses,
            self.config.chain_params.base.committee_size as usize,
            self.config.chain_params.base.observer_count as usize,
        );
        self.epoch_start_height = epoch_start_height;
        Ok(())
    }

    /// This node's slot in the current epoch's schedule for `height`, if
    /// any (absent means it is not part of the active committee roster).
    pub fn our_slot(&self, height: u64) -> Option<&ScheduleEntry> {
        slot_for_height(self.epoch_start_height, height, &self.schedule)
            .filter(|entry| entry.account == self.witness_account)
    }

    /// Validates `block` (conditions 1-9) against the local head, using
    /// `witnesses_at_height` and freshly-looked-up signing keys.
    pub fn validate_candidate(&mut self, block: &Block, parent: &Block, now_ms: i64) -> Result<(), BlockError> {
        let witnesses = self
            .witnesses()
            .map_err(|e| BlockError::Shape(format!("failed to load witnesses: {e}")))?;
        let witness_keys = self
            .witness_keys(&witnesses)
            .map_err(|e| BlockError::Shape(format!("failed to load witness keys: {e}")))?;
        let ctx = ValidationContext {
            parent,
            schedule: &self.schedule,
            epoch_start_height: self.epoch_start_height,
            base_block_interval_ms: self.config.chain_params.base.block_interval_ms,
            max_drift_ms: self.config.chain_params.base.max_timestamp_drift_ms,
            now_ms,
            max_tx_per_block: self.config.chain_params.base.max_tx_per_block as usize,
            witnesses: &witnesses,
            witness_keys: &witness_keys,
            seen_at_height: &[],
        };
        validate_block_shape_and_authority(block, &ctx)?;
        check_dist_reproduces(block, &mut self.state)
    }

    /// Applies a finalized block: executes its transactions for real,
    /// appends it to the block store, flushes the cache, and prunes the
    /// mempool of whatever it included. A flush failure is fatal (spec.md
    /// §7 `StorageFail`): the caller should stop the node rather than
    /// leave the cache and block store out of sync.
    pub fn apply_finalized_block(&mut self, block: &Block) -> Result<(), NodeError> {
        for tx in &block.transactions {
            self.state.process_transaction(tx)?;
        }
        self.state.cache_mut().flush()?;
        self.block_store.append(block)?;
        self.mempool.prune_committed(
            block
                .transactions
                .iter()
                .map(|tx| (tx.sender.as_str(), tx.hash.as_str(), tx.timestamp)),
        );
        self.sync.observe_local_progress(block.anchor_height);
        Ok(())
    }

    /// Signs `block`'s hash with the witness account key, producing the
    /// signature the rest of the committee will verify.
    pub fn sign_block(&self, block: &mut Block) -> Result<(), NodeError> {
        block.hash = block
            .compute_hash()
            .map_err(|e| NodeError::Block(BlockError::Shape(e.to_string())))?;
        let digest = hex_to_32(&block.hash)
            .map_err(|_| NodeError::Block(BlockError::Shape("malformed computed hash".to_string())))?;
        block.signature = self
            .witness_keypair
            .private
            .sign(&digest)
            .map_err(|e| NodeError::Block(BlockError::Shape(e.to_string())))?;
        Ok(())
    }

    /// Verifies a peer-claimed signature with the node's own transport key
    /// material (used for wire-frame and handshake signatures, never block
    /// signatures, which use the witness account key per spec.md §9).
    pub fn verify_peer_signature(public_key_b58: &str, digest: &[u8; 32], signature: &str) -> bool {
        PublicKey::from_base58(public_key_b58)
            .and_then(|key| key.verify(digest, signature))
            .is_ok()
    }

    /// Selects mempool transactions plus any pending anchor-derived
    /// transactions to include in the next produced block, in inclusion
    /// order (anchor-derived first, per spec.md §3).
    pub fn select_block_transactions(&self, anchor_txs: Vec<Transaction>, limit: usize) -> Vec<Transaction> {
        let remaining = limit.saturating_sub(anchor_txs.len());
        let mut txs = anchor_txs;
        txs.extend(self.mempool.select_transactions(remaining));
        txs
    }
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
