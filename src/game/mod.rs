//! Game simulation modules
//!
//! Everything under `game` is pure and synchronous: the simulator and codec
//! hold no resources and are safe to call from any execution context, as
//! long as no two callers step the same `MatchState` concurrently.

pub mod combat;
pub mod map;
pub mod physics;
pub mod sim;
pub mod snapshot;
pub mod state;

pub use sim::step;
pub use snapshot::{decode_snapshot, encode_snapshot, SnapshotDecoded, SnapshotError};
pub use state::{MatchState, MatchStatus, PlayerState};

use serde::{Deserialize, Serialize};

pub const MAX_PLAYERS: usize = 8;

pub const WORLD_WIDTH: i32 = 1024;
pub const WORLD_HEIGHT: i32 = 1024;

pub const PLAYER_RADIUS: i32 = 10;
pub const PLAYER_SPEED_PER_TICK: i32 = 4;
pub const PLAYER_MAX_HP: i32 = 100;

pub const RESPAWN_TICKS: u32 = 60;
pub const FIRE_COOLDOWN_TICKS: u32 = 8;
pub const SHOT_RANGE: f64 = 400.0;
pub const SHOT_DAMAGE: i32 = 25;

pub const MATCH_DURATION_MS: u64 = 180_000;
pub const MATCH_SCORE_TO_WIN: u32 = 15;

/// Seconds a lone player waits before the match starts anyway.
pub const WAITING_START_SECS: u32 = 10;

/// Per-tick input for one slot.
///
/// Inputs are untrusted: the simulator normalizes out-of-range move/aim
/// directions to "none" instead of rejecting them, so a hostile or buggy
/// client can never stall the tick loop. A slot without a fresh input is
/// simulated with the default (all-zero) value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInput {
    pub seq: u32,
    pub move_dir: i32,
    pub aim_dir: i32,
    pub fire: bool,
    pub ts: u64,
}
