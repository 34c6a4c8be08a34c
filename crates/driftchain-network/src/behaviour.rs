//! The composed libp2p network behaviour: request/response for
//! handshake/recovery queries, gossipsub for flood-gossiped messages, and
//! identify for transport-level peer metadata.

use std::io;

use futures::prelude::*;
use libp2p::request_response::{self, ProtocolSupport};
use libp2p::{gossipsub, identify, StreamProtocol};

use crate::wire::Frame;

/// The request/response protocol identifier for direct query/reply
/// exchanges (`QUERY_NODE_STATUS`, `QUERY_BLOCK`, `QUERY_PEER_LIST`).
pub const QUERY_PROTOCOL: StreamProtocol = StreamProtocol::new("/driftchain/query/1");

/// The gossipsub topic flood-gossiped messages (`NEW_BLOCK`,
/// `BLOCK_CONF_ROUND`, `STEEM_SYNC_STATUS`) are published on.
pub fn gossip_topic() -> gossipsub::IdentTopic {
    gossipsub::IdentTopic::new("driftchain/blocks/1")
}

/// JSON-over-request-response codec for [`Frame`] query/reply pairs,
/// bounded to prevent an unbounded read from a misbehaving peer.
#[derive(Clone, Default)]
pub struct FrameCodec;

const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

#[async_trait::async_trait]
impl request_response::Codec for FrameCodec {
    type Protocol = StreamProtocol;
    type Request = Frame;
    type Response = Frame;

    async fn read_request<T>(&mut self, _: &Self::Protocol, io: &mut T) -> io::Result<Frame>
    where
        T: AsyncRead + Unpin + Send,
    {
        read_frame(io).await
    }

    async fn read_response<T>(&mut self, _: &Self::Protocol, io: &mut T) -> io::Result<Frame>
    where
        T: AsyncRead + Unpin + Send,
    {
        read_frame(io).await
    }

    async fn write_request<T>(&mut self, _: &Self::Protocol, io: &mut T, req: Frame) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        write_frame(io, &req).await
    }

    async fn write_response<T>(&mut self, _: &Self::Protocol, io: &mut T, res: Frame) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        write_frame(io, &res).await
    }
}

async fn read_frame<T: AsyncRead + Unpin + Send>(io: &mut T) -> io::Result<Frame> {
    let mut len_buf = [0u8; 4];
    io.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }
    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf).await?;
    serde_json::from_slice(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn write_frame<T: AsyncWrite + Unpin + Send>(io: &mut T, frame: &Frame) -> io::Result<()> {
    let bytes = serde_json::to_vec(frame).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if bytes.len() > MAX_FRAME_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }
    io.write_all(&(bytes.len() as u32).to_be_bytes()).await?;
    io.write_all(&bytes).await?;
    io.flush().await
}

/// The node's composed libp2p behaviour.
#[derive(libp2p::swarm::NetworkBehaviour)]
pub struct DriftchainBehaviour {
    pub query: request_response::Behaviour<FrameCodec>,
    pub gossipsub: gossipsub::Behaviour,
    pub identify: identify::Behaviour,
}

impl DriftchainBehaviour {
    pub fn new(local_key: &libp2p::identity::Keypair, protocol_version: &str) -> Result<Self, gossipsub::SubscriptionError> {
        let query = request_response::Behaviour::new(
            [(QUERY_PROTOCOL, ProtocolSupport::Full)],
            request_response::Config::default(),
        );
        let gossipsub_config = gossipsub::ConfigBuilder::default()
            .validation_mode(gossipsub::ValidationMode::Strict)
            .build()
            .expect("valid gossipsub config");
        let mut gossipsub = gossipsub::Behaviour::new(
            gossipsub::MessageAuthenticity::Signed(local_key.clone()),
            gossipsub_config,
        )
        .expect("valid gossipsub behaviour");
        gossipsub.subscribe(&gossip_topic())?;
        let identify = identify::Behaviour::new(identify::Config::new(
            protocol_version.to_string(),
            local_key.public(),
        ));
        Ok(Self {
            query,
            gossipsub,
            identify,
        })
    }
}
