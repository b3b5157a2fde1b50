//! Authoritative match state

use serde::{Deserialize, Serialize};

use super::{map, MAX_PLAYERS, PLAYER_MAX_HP};

/// Lifecycle of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    /// Waiting for enough players
    Waiting,
    /// Simulation in progress
    Running,
    /// Terminal; the simulation never resumes
    Ended,
}

/// State of one player slot (authoritative)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerState {
    pub present: bool,
    pub x: i32,
    pub y: i32,
    pub hp: i32,
    pub alive: bool,
    pub score: u32,
    pub aim_dir: u8,
    pub respawn_ticks: u32,
    pub fire_cooldown_ticks: u32,
}

/// The authoritative world for one match.
///
/// Owned exclusively by whichever process currently holds the match's leader
/// lease; everyone else observes it through snapshots only.
#[derive(Debug, Clone)]
pub struct MatchState {
    pub match_id: String,
    /// Incremented exactly once per simulation step
    pub tick: u32,
    /// Incremented only when a snapshot is actually emitted
    pub snapshot_seq: u32,
    pub status: MatchStatus,
    /// Tick at which status became Running
    pub start_tick: u32,
    /// Bit i set ⇔ players[i].present
    pub player_mask: u8,
    pub players: [PlayerState; MAX_PLAYERS],
}

impl MatchState {
    pub fn new(match_id: impl Into<String>) -> Self {
        Self {
            match_id: match_id.into(),
            tick: 0,
            snapshot_seq: 0,
            status: MatchStatus::Waiting,
            start_tick: 0,
            player_mask: 0,
            players: [PlayerState::default(); MAX_PLAYERS],
        }
    }

    pub fn present_count(&self) -> usize {
        self.players.iter().filter(|p| p.present).count()
    }

    /// Reconcile slots with a new presence mask.
    ///
    /// Slots turning present spawn fresh; slots turning absent are zeroed but
    /// keep their array position. Idempotent for an unchanged mask.
    pub fn apply_player_mask(&mut self, new_mask: u8) {
        let added = new_mask & !self.player_mask;
        self.player_mask = new_mask;

        for slot in 0..MAX_PLAYERS {
            let bit = 1u8 << slot;
            if added & bit != 0 {
                spawn_into(&mut self.players[slot], slot);
            }
            if new_mask & bit == 0 {
                self.players[slot] = PlayerState::default();
            }
        }
    }

    /// Adopt a status published in match metadata by an external writer
    /// (matchmaking flips Waiting → Running when a second player joins).
    /// Stamps `start_tick` so the duration clock starts at the handoff.
    pub fn apply_published_status(&mut self, status: MatchStatus) {
        if self.status == MatchStatus::Waiting && status == MatchStatus::Running {
            self.start_tick = self.tick;
        }
        self.status = status;
    }
}

/// (Re)spawn a slot at its fixed spawn point with full HP and cleared
/// countdowns. Score and aim direction survive respawns.
pub(crate) fn spawn_into(player: &mut PlayerState, slot: usize) {
    let (x, y) = map::spawn_point(slot);
    player.present = true;
    player.x = x;
    player.y = y;
    player.hp = PLAYER_MAX_HP;
    player.alive = true;
    player.respawn_ticks = 0;
    player.fire_cooldown_ticks = 0;
}
