//! Wire protocol between the game server and its clients
//!
//! Each frame is a big-endian `u32` length followed by a bincode-encoded
//! [`Envelope`]. Frames on one connection are delivered in the order they
//! were queued, which is what keeps "entity created" ahead of any message
//! that refers to the entity.

use crate::coords::TileKey;
use crate::entity::{
    EntityKey, EntitySnapshot, ItemKind, ItemState, PlayerState, SaplingState, StoneState,
    TreeState,
};
use crate::error::ValidationError;
use crate::fence::{FenceMaterial, FencePieceType, FenceState};
use bincode::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound on a single frame; full snapshots are the largest messages
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Session id used for messages the server originates on its own
pub const SERVER_SESSION: u32 = 0;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
}

/// A packet tagged with the session that caused it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub session: u32,
    pub packet: Packet,
}

impl Envelope {
    pub fn new(session: u32, packet: Packet) -> Self {
        Self { session, packet }
    }
}

/// Request kinds, echoed back in rejections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Move,
    Attack,
    PlaceFence,
    RemoveFence,
    ClearEnclosure,
    Plant,
    PickUp,
}

/// Everything a client needs to rebuild its mirror of the world
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub trees: Vec<TreeState>,
    pub stones: Vec<StoneState>,
    pub saplings: Vec<SaplingState>,
    pub items: Vec<ItemState>,
    pub fences: Vec<FenceState>,
    pub players: Vec<PlayerState>,
    /// Tiles whose tree or stone is gone for good
    pub cleared_trees: Vec<TileKey>,
    pub cleared_stones: Vec<TileKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    // client -> server
    Connect {
        client_version: u32,
        player_name: String,
    },
    Heartbeat,
    Move {
        x: f32,
        y: f32,
    },
    Attack {
        target: EntityKey,
    },
    PlaceFence {
        position: TileKey,
        material: FenceMaterial,
        piece_type: Option<FencePieceType>,
    },
    RemoveFence {
        fence_id: u64,
    },
    ClearEnclosure {
        near: TileKey,
    },
    Plant {
        position: TileKey,
    },
    PickUp {
        item_id: u64,
    },
    RequestResync,
    Disconnect,

    // server -> client
    Connected {
        player_id: u32,
        world_seed: u64,
    },
    EntityCreated {
        entity: EntitySnapshot,
    },
    EntityHealthUpdate {
        key: EntityKey,
        health: u32,
    },
    EntityDestroyed {
        key: EntityKey,
    },
    /// Creates the piece, or replaces the stored record for a known id
    FenceCreated {
        fence: FenceState,
    },
    FenceRemoved {
        fence_id: u64,
    },
    InventoryUpdate {
        player_id: u32,
        counts: BTreeMap<ItemKind, u32>,
    },
    /// Authoritative inventory, sent on (re)connect
    InventorySync {
        counts: BTreeMap<ItemKind, u32>,
    },
    WorldSnapshot {
        snapshot: Box<WorldSnapshot>,
    },
    PlayerJoined {
        player: PlayerState,
    },
    PlayerMoved {
        player_id: u32,
        x: f32,
        y: f32,
    },
    PlayerLeft {
        player_id: u32,
    },
    ActionRejected {
        action: Action,
        reason: ValidationError,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    /// Packets that a client may send
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Packet::Connect { .. }
                | Packet::Heartbeat
                | Packet::Move { .. }
                | Packet::Attack { .. }
                | Packet::PlaceFence { .. }
                | Packet::RemoveFence { .. }
                | Packet::ClearEnclosure { .. }
                | Packet::Plant { .. }
                | Packet::PickUp { .. }
                | Packet::RequestResync
                | Packet::Disconnect
        )
    }
}

/// Serializes an envelope into a complete length-prefixed frame
pub fn encode_frame(envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    let payload = serialize(envelope)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Deserializes a frame payload (without its length prefix)
pub fn decode_payload(payload: &[u8]) -> Result<Envelope, ProtocolError> {
    Ok(deserialize(payload)?)
}

pub async fn write_frame<W>(writer: &mut W, envelope: &Envelope) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(envelope)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the next frame; `Ok(None)` means the peer closed the stream cleanly
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Envelope>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    decode_payload(&payload).map(Some)
}
