//! Binary snapshot codec
//!
//! The snapshot is the only state that crosses the core's external boundary:
//! a fixed-layout little-endian frame, broadcast to clients and persisted for
//! leader handoff. Layout:
//!
//! ```text
//! version:u8  snapshotSeq:u32  serverTick:u32  playerCount:u8(=8)
//! 8 × { present:u8 x:u16 y:u16 hp:u8 alive:u8 score:u16 aimDir:u8
//!       respawnTicks:u16 fireCooldownTicks:u16 }
//! ```
//!
//! No terminator, no compression. Total length is always exactly
//! [`SNAPSHOT_BYTES`]; anything else is malformed.

use thiserror::Error;

use crate::util::time::{SERVER_TICK_HZ, SNAPSHOT_HZ};

use super::state::PlayerState;
use super::{MAX_PLAYERS, WORLD_HEIGHT, WORLD_WIDTH};

pub const SNAPSHOT_VERSION: u8 = 1;

const HEADER_BYTES: usize = 1 + 4 + 4 + 1;
const PLAYER_BYTES: usize = 14;
pub const SNAPSHOT_BYTES: usize = HEADER_BYTES + MAX_PLAYERS * PLAYER_BYTES;

/// Decode failure. Decoding aborts without applying partial state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("malformed snapshot: length {actual}, expected {expected}")]
    Length { actual: usize, expected: usize },

    #[error("malformed snapshot: player count {0}, expected {MAX_PLAYERS}")]
    PlayerCount(u8),
}

/// A decoded snapshot frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDecoded {
    pub version: u8,
    pub snapshot_seq: u32,
    pub server_tick: u32,
    pub players: [PlayerState; MAX_PLAYERS],
}

/// Encode one instant of match state. Total: never fails on a well-formed
/// player array; out-of-range values are clamped into their wire fields.
pub fn encode_snapshot(
    snapshot_seq: u32,
    server_tick: u32,
    players: &[PlayerState; MAX_PLAYERS],
) -> [u8; SNAPSHOT_BYTES] {
    let mut bytes = [0u8; SNAPSHOT_BYTES];
    bytes[0] = SNAPSHOT_VERSION;
    bytes[1..5].copy_from_slice(&snapshot_seq.to_le_bytes());
    bytes[5..9].copy_from_slice(&server_tick.to_le_bytes());
    bytes[9] = MAX_PLAYERS as u8;

    for (i, p) in players.iter().enumerate() {
        let o = HEADER_BYTES + i * PLAYER_BYTES;
        if !p.present {
            // Absent slots encode as an all-zero record.
            continue;
        }
        bytes[o] = 1;
        let x = p.x.clamp(0, WORLD_WIDTH) as u16;
        let y = p.y.clamp(0, WORLD_HEIGHT) as u16;
        bytes[o + 1..o + 3].copy_from_slice(&x.to_le_bytes());
        bytes[o + 3..o + 5].copy_from_slice(&y.to_le_bytes());
        bytes[o + 5] = p.hp.clamp(0, 255) as u8;
        bytes[o + 6] = p.alive as u8;
        let score = p.score.min(65_535) as u16;
        bytes[o + 7..o + 9].copy_from_slice(&score.to_le_bytes());
        bytes[o + 9] = p.aim_dir.min(15);
        let respawn = p.respawn_ticks.min(65_535) as u16;
        bytes[o + 10..o + 12].copy_from_slice(&respawn.to_le_bytes());
        let cooldown = p.fire_cooldown_ticks.min(65_535) as u16;
        bytes[o + 12..o + 14].copy_from_slice(&cooldown.to_le_bytes());
    }

    bytes
}

/// Decode a snapshot frame. Fails on any structural mismatch; never
/// truncates or pads.
pub fn decode_snapshot(bytes: &[u8]) -> Result<SnapshotDecoded, SnapshotError> {
    if bytes.len() != SNAPSHOT_BYTES {
        return Err(SnapshotError::Length {
            actual: bytes.len(),
            expected: SNAPSHOT_BYTES,
        });
    }

    let version = bytes[0];
    let snapshot_seq = u32::from_le_bytes(bytes[1..5].try_into().unwrap());
    let server_tick = u32::from_le_bytes(bytes[5..9].try_into().unwrap());
    let player_count = bytes[9];
    if player_count != MAX_PLAYERS as u8 {
        return Err(SnapshotError::PlayerCount(player_count));
    }

    let mut players = [PlayerState::default(); MAX_PLAYERS];
    for (i, p) in players.iter_mut().enumerate() {
        let o = HEADER_BYTES + i * PLAYER_BYTES;
        let present = bytes[o] == 1;
        p.present = present;
        p.x = u16::from_le_bytes(bytes[o + 1..o + 3].try_into().unwrap()) as i32;
        p.y = u16::from_le_bytes(bytes[o + 3..o + 5].try_into().unwrap()) as i32;
        p.hp = bytes[o + 5] as i32;
        p.alive = present && bytes[o + 6] == 1;
        p.score = u16::from_le_bytes(bytes[o + 7..o + 9].try_into().unwrap()) as u32;
        p.aim_dir = bytes[o + 9];
        p.respawn_ticks = u16::from_le_bytes(bytes[o + 10..o + 12].try_into().unwrap()) as u32;
        p.fire_cooldown_ticks =
            u16::from_le_bytes(bytes[o + 12..o + 14].try_into().unwrap()) as u32;
    }

    Ok(SnapshotDecoded {
        version,
        snapshot_seq,
        server_tick,
        players,
    })
}

/// Tracks the snapshot emission cadence within the tick loop: emits
/// `SNAPSHOT_HZ` out of every `SERVER_TICK_HZ` ticks, evenly spread.
#[derive(Debug, Default)]
pub struct SnapshotCadence {
    acc: u32,
}

impl SnapshotCadence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call once per tick; true when this tick should emit a snapshot
    pub fn should_emit(&mut self) -> bool {
        self.acc += SNAPSHOT_HZ;
        if self.acc >= SERVER_TICK_HZ {
            self.acc -= SERVER_TICK_HZ;
            true
        } else {
            false
        }
    }
}
