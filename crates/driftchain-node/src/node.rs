//! The witness node's main event loop: timer-driven mining/ingestion/
//! liveness ticks interleaved with inbound libp2p swarm events, all on one
//! task. Grounded on the upstream kernel's `run_consensus_ticker` /
//! `run_sync_discoverer` / `run_main_loop` trio
//! (`validator/src/standard/orchestration/mod.rs`), collapsed into a single
//! `tokio::select!` since this node has no separate IPC/RPC surface to
//! coordinate with.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use driftchain_ingestor::anchor::{decode_custom_operation, AnchorClient};
use driftchain_network::{
    accept_handshake_reply, generate_challenge, gossip_topic, within_clock_tolerance, DriftchainBehaviour,
    DriftchainBehaviourEvent, Frame, HandshakePolicy, MessageType, NodeStatus, Payload,
};
use driftchain_types::Block;
use futures::StreamExt;
use libp2p::request_response;
use libp2p::{gossipsub, identify, Multiaddr, PeerId, Swarm};
use tokio::sync::Mutex;
use tokio::time::{self, MissedTickBehavior};

use crate::context::NodeContext;
use crate::error::NodeError;

/// Per-connection state the handshake needs across the request/response
/// round trip: the challenge this node issued, so the reply's signature can
/// be checked against the exact bytes it was meant to cover.
#[derive(Default)]
struct PendingHandshakes {
    issued: HashMap<PeerId, String>,
}

/// How often the mining tick checks whether it is this witness's turn to
/// propose, relative to the chain's own block interval: twice a block, so
/// a slot isn't missed by more than half an interval.
fn mining_tick_period(block_interval_ms: i64) -> Duration {
    Duration::from_millis((block_interval_ms / 2).max(50) as u64)
}

/// Runs the node until a fatal error (spec.md §7) or the process is asked
/// to stop. `anchor` is the read-only anchor-chain client; `keypair` is the
/// node's libp2p transport identity (distinct from the witness signing key
/// held inside `ctx`).
pub async fn run(
    ctx: Arc<Mutex<NodeContext>>,
    anchor: Arc<dyn AnchorClient>,
    keypair: libp2p::identity::Keypair,
    listen_port: u16,
    chain_id: String,
) -> Result<(), NodeError> {
    let mut swarm = build_swarm(&keypair, &chain_id)?;
    let listen_addr: Multiaddr = format!("/ip4/0.0.0.0/tcp/{listen_port}")
        .parse()
        .expect("well-formed multiaddr");
    swarm
        .listen_on(listen_addr)
        .map_err(|e| NodeError::Config(format!("failed to bind P2P listener: {e}")))?;

    let (max_peers, block_interval_ms, origin_hash) = {
        let guard = ctx.lock().await;
        (
            guard.max_peers as usize,
            guard.config.chain_params.base.block_interval_ms,
            guard.genesis.hash.clone(),
        )
    };
    let handshake_policy = HandshakePolicy {
        local_origin_hash: origin_hash,
        max_peers,
    };
    let mut pending = PendingHandshakes::default();

    let mut mining_ticker = time::interval(mining_tick_period(block_interval_ms));
    mining_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut ingestion_ticker = time::interval(Duration::from_millis(block_interval_ms.max(100) as u64));
    ingestion_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut liveness_ticker = time::interval(Duration::from_secs(5));
    liveness_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut gossip_gc_ticker = time::interval(Duration::from_secs(20));
    gossip_gc_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(port = listen_port, "driftchain node started");

    loop {
        tokio::select! {
            _ = mining_ticker.tick() => {
                if let Err(e) = mining_tick(&ctx, &anchor, &mut swarm).await {
                    tracing::warn!(error = %e, "mining tick failed");
                    if e.is_fatal() {
                        return Err(e);
                    }
                }
            }
            _ = ingestion_ticker.tick() => {
                if let Err(e) = ingestion_tick(&ctx, anchor.as_ref()).await {
                    tracing::warn!(error = %e, "ingestion tick failed");
                    if e.is_fatal() {
                        return Err(e);
                    }
                }
            }
            _ = liveness_ticker.tick() => {
                liveness_tick(&ctx, &swarm).await;
            }
            _ = gossip_gc_ticker.tick() => {
                let mut guard = ctx.lock().await;
                let now = now_ms();
                guard.gossip.purge_stale(now);
                let expired = guard.mempool.prune_expired(now);
                if expired > 0 {
                    tracing::debug!(expired, "pruned stale mempool entries");
                }
            }
            event = swarm.select_next_some() => {
                if let Err(e) = handle_swarm_event(&ctx, &mut swarm, &handshake_policy, &mut pending, event).await {
                    tracing::warn!(error = %e, "error handling swarm event");
                    if e.is_fatal() {
                        return Err(e);
                    }
                }
            }
        }
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn build_swarm(keypair: &libp2p::identity::Keypair, chain_id: &str) -> Result<Swarm<DriftchainBehaviour>, NodeError> {
    let chain_id = chain_id.to_string();
    let swarm = libp2p::SwarmBuilder::with_existing_identity(keypair.clone())
        .with_tokio()
        .with_tcp(
            libp2p::tcp::Config::default(),
            libp2p::noise::Config::new,
            libp2p::yamux::Config::default,
        )
        .map_err(|e| NodeError::Config(format!("failed to build transport: {e}")))?
        .with_behaviour(move |key| {
            DriftchainBehaviour::new(key, &chain_id).map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
        })
        .map_err(|e| NodeError::Config(format!("failed to build behaviour: {e}")))?
        .build();
    Ok(swarm)
}

/// If it is our witness's slot at the next height, proposes a block.
async fn mining_tick(
    ctx: &Arc<Mutex<NodeContext>>,
    anchor: &Arc<dyn AnchorClient>,
    swarm: &mut Swarm<DriftchainBehaviour>,
) -> Result<(), NodeError> {
    let mut guard = ctx.lock().await;
    if !guard.consensus.mining_allowed() {
        return Ok(());
    }
    let parent = match guard.block_store.read_one(guard.consensus.finalized_height())? {
        Some(b) => b,
        None => return Ok(()),
    };
    let height = parent.height + 1;
    if guard.our_slot(height).is_none() {
        return Ok(());
    }

    let now = now_ms();
    let anchor_height = anchor.latest_height().await.map_err(NodeError::from)?;
    let anchor_block = anchor.block_at(anchor_height).await.map_err(NodeError::from)?;
    let mut anchor_txs = Vec::new();
    let (anchor_timestamp, anchor_used_height) = if let Some(ab) = &anchor_block {
        for op in &ab.custom_operations {
            match decode_custom_operation(op, ab.timestamp) {
                Ok(tx) => anchor_txs.push(tx),
                Err(e) => tracing::warn!(error = %e, "dropping undecodable anchor operation"),
            }
        }
        (ab.timestamp, ab.height)
    } else {
        (parent.anchor_timestamp, parent.anchor_height)
    };

    let max_tx_per_block = guard.config.chain_params.base.max_tx_per_block as usize;
    let txs = guard.select_block_transactions(anchor_txs, max_tx_per_block);
    let mut block = Block {
        height,
        parent_hash: parent.hash.clone(),
        anchor_height: anchor_used_height,
        anchor_timestamp,
        timestamp: now,
        transactions: txs,
        witness: guard.witness_account.clone(),
        missed_by: Vec::new(),
        dist: 0,
        sync_flag: driftchain_types::block::SyncFlag {
            mode: guard.sync.mode(),
            anchor_lag: guard.sync.anchor_lag(),
        },
        hash: String::new(),
        signature: String::new(),
    };

    // Scratch execution only, to compute `dist`: every witness (including
    // ourselves) re-executes and checks this independently once the
    // proposal is on the wire, via `check_dist_reproduces`.
    guard.state.cache_mut().checkpoint();
    for tx in &block.transactions {
        let dist = guard.state.process_transaction(tx).map_err(NodeError::from)?;
        block.dist += dist;
    }
    guard.state.cache_mut().rollback();

    guard.sign_block(&mut block)?;
    tracing::info!(height, witness = %block.witness, "proposing block");

    let action = guard.consensus.propose(block.clone(), now);
    drop(guard);
    dispatch_engine_action(ctx, swarm, action).await;
    broadcast_new_block(swarm, &block);
    Ok(())
}

/// Pulls the anchor chain's current tip and feeds [`SyncTracker`] so sync
/// mode reflects how far behind ingestion is running.
async fn ingestion_tick(ctx: &Arc<Mutex<NodeContext>>, anchor: &dyn AnchorClient) -> Result<(), NodeError> {
    let tip = anchor.latest_height().await.map_err(NodeError::from)?;
    let mut guard = ctx.lock().await;
    guard.sync.observe_remote_tip(tip);
    Ok(())
}

/// Resolves same-height sync-mode collisions and checks liveness against
/// currently-connected witness peers.
async fn liveness_tick(ctx: &Arc<Mutex<NodeContext>>, swarm: &Swarm<DriftchainBehaviour>) {
    let connected = swarm.connected_peers().count();
    let mut guard = ctx.lock().await;
    let now = now_ms();
    let resolved = guard.consensus.resolve_collisions(now);
    for (height, hash) in resolved {
        tracing::info!(height, hash, "resolved same-height candidate collision");
    }
    let total_witnesses = guard.witnesses().map(|w| w.len()).unwrap_or(0);
    let force_exited = guard.consensus.check_liveness(connected, total_witnesses);
    if force_exited {
        tracing::warn!("liveness check forced an exit from sync mode; mining halted until peers recover");
    }
}

/// Turns an [`driftchain_consensus::EngineAction`] into the corresponding
/// gossip broadcast or, for `Finalize`, applies the block locally.
async fn dispatch_engine_action(
    ctx: &Arc<Mutex<NodeContext>>,
    swarm: &mut Swarm<DriftchainBehaviour>,
    action: driftchain_consensus::EngineAction,
) {
    use driftchain_consensus::EngineAction;
    match action {
        EngineAction::BroadcastRound0 { height, hash } | EngineAction::BroadcastRound1 { height, hash } => {
            let round = if matches!(action, EngineAction::BroadcastRound0 { .. }) { 0 } else { 1 };
            let guard = ctx.lock().await;
            let vote = driftchain_network::BlockConfRound {
                height,
                hash,
                round,
                voter: guard.witness_account.clone(),
                ts: now_ms(),
            };
            let mut frame = Frame::new(MessageType::BlockConfRound, Payload::BlockConfRound(vote));
            let signed = frame.sign(&guard.witness_account, &guard.node_keypair).is_ok();
            drop(guard);
            if signed {
                publish(swarm, &frame);
            }
        }
        EngineAction::Finalize(block) => {
            let mut guard = ctx.lock().await;
            if let Err(e) = guard.apply_finalized_block(&block) {
                tracing::error!(height = block.height, error = %e, "failed to apply finalized block");
            } else {
                tracing::info!(height = block.height, hash = %block.hash, "finalized block");
            }
        }
        EngineAction::None => {}
    }
}

fn broadcast_new_block(swarm: &mut Swarm<DriftchainBehaviour>, block: &Block) {
    let frame = Frame::new(MessageType::NewBlock, Payload::NewBlock(Box::new(block.clone())));
    publish(swarm, &frame);
}

fn publish(swarm: &mut Swarm<DriftchainBehaviour>, frame: &Frame) {
    let Ok(bytes) = serde_json::to_vec(frame) else {
        return;
    };
    if let Err(e) = swarm.behaviour_mut().gossipsub.publish(gossip_topic(), bytes) {
        tracing::debug!(error = %e, "gossip publish failed (no subscribed peers yet?)");
    }
}

async fn handle_swarm_event(
    ctx: &Arc<Mutex<NodeContext>>,
    swarm: &mut Swarm<DriftchainBehaviour>,
    handshake_policy: &HandshakePolicy,
    pending: &mut PendingHandshakes,
    event: libp2p::swarm::SwarmEvent<DriftchainBehaviourEvent>,
) -> Result<(), NodeError> {
    use libp2p::swarm::SwarmEvent;
    match event {
        SwarmEvent::NewListenAddr { address, .. } => {
            tracing::info!(%address, "listening");
        }
        SwarmEvent::ConnectionEstablished { peer_id, .. } => {
            tracing::info!(%peer_id, "connection established");
            let challenge = generate_challenge();
            let request = Frame::new(MessageType::QueryNodeStatus, Payload::QueryNodeStatus {
                challenge: challenge.clone(),
            });
            pending.issued.insert(peer_id, challenge);
            let _ = swarm.behaviour_mut().query.send_request(&peer_id, request);
        }
        SwarmEvent::ConnectionClosed { peer_id, .. } => {
            pending.issued.remove(&peer_id);
        }
        SwarmEvent::Behaviour(DriftchainBehaviourEvent::Gossipsub(gossipsub::Event::Message { message, .. })) => {
            handle_gossip_message(ctx, swarm, message).await?;
        }
        SwarmEvent::Behaviour(DriftchainBehaviourEvent::Query(request_response::Event::Message {
            peer,
            message,
            ..
        })) => {
            handle_query_message(ctx, swarm, peer, message, handshake_policy, pending).await?;
        }
        SwarmEvent::Behaviour(DriftchainBehaviourEvent::Identify(identify::Event::Received { peer_id, .. })) => {
            tracing::debug!(%peer_id, "identify info received");
        }
        _ => {}
    }
    Ok(())
}

async fn handle_gossip_message(
    ctx: &Arc<Mutex<NodeContext>>,
    swarm: &mut Swarm<DriftchainBehaviour>,
    message: gossipsub::Message,
) -> Result<(), NodeError> {
    let frame: Frame = match serde_json::from_slice(&message.data) {
        Ok(f) => f,
        Err(_) => return Ok(()),
    };
    let Some(sig) = frame.sig_key().map(str::to_string) else {
        return Ok(());
    };
    let now = now_ms();
    let first_seen = {
        let mut guard = ctx.lock().await;
        guard.gossip.observe(&sig, now)
    };
    if !first_seen {
        return Ok(());
    }

    match frame.data {
        Payload::NewBlock(block) => {
            let mut guard = ctx.lock().await;
            let parent = guard.block_store.read_one(block.height.saturating_sub(1))?;
            let Some(parent) = parent else {
                drop(guard);
                return Ok(());
            };
            match guard.validate_candidate(&block, &parent, now) {
                Ok(()) => {
                    let action = guard.consensus.propose(*block, now);
                    drop(guard);
                    dispatch_engine_action(ctx, swarm, action).await;
                }
                Err(e) => tracing::warn!(error = %e, "rejected gossiped block"),
            }
        }
        Payload::BlockConfRound(vote) => {
            let block_interval_ms = {
                let guard = ctx.lock().await;
                guard.config.chain_params.base.block_interval_ms
            };
            if !within_clock_tolerance(vote.ts, now, block_interval_ms) {
                return Ok(());
            }
            let mut guard = ctx.lock().await;
            let result = if vote.round == 0 {
                guard.consensus.record_round0(vote.height, &vote.hash, vote.voter)
            } else {
                guard.consensus.record_round1(vote.height, &vote.hash, vote.voter)
            };
            drop(guard);
            if let Ok(action) = result {
                dispatch_engine_action(ctx, swarm, action).await;
            }
        }
        Payload::SyncStatus(status) => {
            tracing::debug!(account = %status.account, behind = status.behind_blocks, "peer sync status");
        }
        _ => {}
    }
    Ok(())
}

async fn handle_query_message(
    ctx: &Arc<Mutex<NodeContext>>,
    swarm: &mut Swarm<DriftchainBehaviour>,
    peer: PeerId,
    message: request_response::Message<Frame, Frame>,
    handshake_policy: &HandshakePolicy,
    pending: &mut PendingHandshakes,
) -> Result<(), NodeError> {
    match message {
        request_response::Message::Request { request, channel, .. } => {
            let reply = build_query_reply(ctx, request).await;
            let _ = swarm.behaviour_mut().query.send_response(channel, reply);
        }
        request_response::Message::Response { response, .. } => {
            if let Payload::NodeStatus(status) = &response.data {
                verify_handshake_reply(ctx, handshake_policy, pending, &peer, status, &response).await;
            }
        }
    }
    Ok(())
}

async fn build_query_reply(ctx: &Arc<Mutex<NodeContext>>, request: Frame) -> Frame {
    let guard = ctx.lock().await;
    match request.data {
        Payload::QueryNodeStatus { .. } => {
            let head = guard.block_store.tip_height().unwrap_or(None).unwrap_or(0);
            let head_block = guard.block_store.read_one(head).unwrap_or(None);
            let status = NodeStatus {
                node_id: guard.witness_account.clone(),
                head,
                head_hash: head_block.as_ref().map(|b| b.hash.clone()).unwrap_or_default(),
                parent_hash: head_block.as_ref().map(|b| b.parent_hash.clone()).unwrap_or_default(),
                origin_hash: guard.genesis.hash.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            };
            let mut frame = Frame::new(MessageType::NodeStatus, Payload::NodeStatus(status));
            let _ = frame.sign(&guard.witness_account, &guard.node_keypair);
            frame
        }
        Payload::QueryBlock { height } => match guard.block_store.read_one(height) {
            Ok(Some(block)) => Frame::new(MessageType::Block, Payload::Block(Box::new(block))),
            _ => Frame::new(MessageType::QueryPeerList, Payload::QueryPeerList),
        },
        Payload::QueryPeerList => Frame::new(
            MessageType::PeerList,
            Payload::PeerList {
                peers: guard.address_book.to_peer_list(),
            },
        ),
        _ => Frame::new(MessageType::QueryPeerList, Payload::QueryPeerList),
    }
}

/// Checks an inbound `NODE_STATUS` handshake reply against the challenge we
/// issued to `peer` and the claimed signer's registered public key.
async fn verify_handshake_reply(
    ctx: &Arc<Mutex<NodeContext>>,
    policy: &HandshakePolicy,
    pending: &mut PendingHandshakes,
    peer: &PeerId,
    status: &NodeStatus,
    frame: &Frame,
) {
    let Some(sig) = &frame.sig else {
        tracing::warn!(%peer, "peer sent unsigned handshake reply");
        return;
    };
    let Some(challenge) = pending.issued.remove(peer) else {
        tracing::warn!(%peer, "handshake reply with no matching outstanding challenge");
        return;
    };
    let mut guard = ctx.lock().await;
    let witnesses = match guard.witnesses() {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load witness roster for handshake check");
            return;
        }
    };
    let witness_keys = match guard.witness_keys(&witnesses) {
        Ok(k) => k,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load witness keys for handshake check");
            return;
        }
    };
    let Some((_, public_key_b58)) = witness_keys.iter().find(|(account, _)| account == &status.node_id) else {
        tracing::warn!(node_id = %status.node_id, "handshake reply from an unregistered witness account");
        return;
    };
    let Ok(public_key) = driftchain_crypto::PublicKey::from_base58(public_key_b58) else {
        tracing::warn!(node_id = %status.node_id, "malformed registered public key");
        return;
    };

    let peer_count = guard.known_peers.len();
    let result = accept_handshake_reply(
        policy,
        &guard.known_peers,
        peer_count,
        &challenge,
        status,
        &sig.signature,
        &public_key,
    );
    match result {
        Ok(()) => {
            guard.known_peers.insert(status.node_id.clone());
            tracing::info!(node_id = %status.node_id, %peer, "handshake verified");
        }
        Err(e) => tracing::warn!(node_id = %status.node_id, error = %e, "handshake rejected"),
    }
}
