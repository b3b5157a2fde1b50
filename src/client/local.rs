//! Offline local simulation
//!
//! When there is no connection the client runs the match itself: the same
//! `step` the server runs, at the same tick rate, and the rendered state is
//! the most recent encode→decode round trip of it. Offline rendering
//! therefore exercises the identical codec+simulator path as network play —
//! if it looks right offline, the contracts are right.

use crate::game::snapshot::SnapshotDecoded;
use crate::game::{
    decode_snapshot, encode_snapshot, step, MatchState, MatchStatus, PlayerInput, MAX_PLAYERS,
};
use crate::util::time::SERVER_TICK_HZ;

const STEP_MS: f64 = 1000.0 / SERVER_TICK_HZ as f64;

/// Slots occupied in an offline match: the local player plus three bots
const LOCAL_MASK: u8 = 0x0f;

/// Self-contained offline match driven at the fixed tick rate
pub struct LocalSim {
    state: MatchState,
    controlled: PlayerInput,
    accumulator_ms: f64,
    latest: Option<SnapshotDecoded>,
}

impl Default for LocalSim {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSim {
    pub fn new() -> Self {
        let mut state = MatchState::new("local");
        state.apply_player_mask(LOCAL_MASK);
        state.apply_published_status(MatchStatus::Running);
        Self {
            state,
            controlled: PlayerInput::default(),
            accumulator_ms: 0.0,
            latest: None,
        }
    }

    /// Latest input for the locally controlled slot (slot 0)
    pub fn set_input(&mut self, input: PlayerInput) {
        self.controlled = input;
    }

    /// Advance by a frame delta, stepping however many fixed ticks fit
    pub fn advance(&mut self, dt_ms: f64) {
        self.accumulator_ms += dt_ms;
        while self.accumulator_ms >= STEP_MS {
            self.accumulator_ms -= STEP_MS;
            self.tick();
        }
    }

    /// Most recent round-tripped state, if any tick has run yet
    pub fn latest(&self) -> Option<&SnapshotDecoded> {
        self.latest.as_ref()
    }

    pub fn tick_count(&self) -> u32 {
        self.state.tick
    }

    fn tick(&mut self) {
        let mut inputs = [PlayerInput::default(); MAX_PLAYERS];
        inputs[0] = self.controlled;
        for (slot, input) in inputs.iter_mut().enumerate().skip(1) {
            if self.state.players[slot].present {
                *input = bot_input(self.state.tick, slot);
            }
        }

        step(&mut self.state, &inputs);
        self.state.snapshot_seq += 1;
        let bytes = encode_snapshot(self.state.snapshot_seq, self.state.tick, &self.state.players);
        // Infallible: we just encoded a frame of the right shape.
        self.latest = decode_snapshot(&bytes).ok();
    }
}

/// Scripted wandering for offline bots, derived purely from the tick counter
fn bot_input(tick: u32, slot: usize) -> PlayerInput {
    PlayerInput {
        seq: 0,
        move_dir: ((tick / 20 + slot as u32) % 8 + 1) as i32,
        aim_dir: ((tick / 30 + slot as u32 * 2) % 16) as i32,
        fire: tick % (20 + slot as u32) == 0,
        ts: 0,
    }
}
