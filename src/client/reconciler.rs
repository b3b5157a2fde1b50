//! Snapshot buffering and interpolation
//!
//! Snapshots arrive at 12 Hz while rendering runs at display rate, so the
//! reconciler renders one snapshot interval in the past and interpolates
//! positions between the two most recently received samples. Samples are
//! kept in arrival order — a late or duplicated snapshot just becomes the
//! newest sample and ages out; no ordering is enforced.

use crate::game::snapshot::SnapshotDecoded;
use crate::game::{decode_snapshot, PlayerState, SnapshotError};
use crate::util::time::SNAPSHOT_HZ;

/// Delay between receipt and render: one snapshot interval
const INTERP_DELAY_MS: f64 = 1000.0 / SNAPSHOT_HZ as f64;

/// A player as the render layer sees it. Positions are fractional because
/// they interpolate between integer snapshot positions; everything else is
/// instantaneous and comes verbatim from the newer sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPlayer {
    pub present: bool,
    pub x: f64,
    pub y: f64,
    pub hp: i32,
    pub alive: bool,
    pub score: u32,
    pub aim_dir: u8,
    pub respawn_ticks: u32,
    pub fire_cooldown_ticks: u32,
}

impl From<&PlayerState> for RenderPlayer {
    fn from(p: &PlayerState) -> Self {
        Self {
            present: p.present,
            x: p.x as f64,
            y: p.y as f64,
            hp: p.hp,
            alive: p.alive,
            score: p.score,
            aim_dir: p.aim_dir,
            respawn_ticks: p.respawn_ticks,
            fire_cooldown_ticks: p.fire_cooldown_ticks,
        }
    }
}

/// Continuously queryable render state
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    pub snapshot_seq: u32,
    pub server_tick: u32,
    pub players: Vec<RenderPlayer>,
}

#[derive(Debug, Clone)]
struct Sample {
    received_at: u64,
    snapshot_seq: u32,
    server_tick: u32,
    players: Vec<PlayerState>,
}

impl Sample {
    fn to_render(&self) -> RenderState {
        RenderState {
            snapshot_seq: self.snapshot_seq,
            server_tick: self.server_tick,
            players: self.players.iter().map(RenderPlayer::from).collect(),
        }
    }
}

/// Buffers the two most recently received snapshots and answers render
/// queries for any target time.
#[derive(Debug, Default)]
pub struct Reconciler {
    samples: Vec<Sample>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode and buffer a raw snapshot frame
    pub fn ingest_bytes(&mut self, bytes: &[u8], received_at_ms: u64) -> Result<(), SnapshotError> {
        let decoded = decode_snapshot(bytes)?;
        self.ingest(&decoded, received_at_ms);
        Ok(())
    }

    /// Buffer a decoded snapshot tagged with its local receipt time
    pub fn ingest(&mut self, decoded: &SnapshotDecoded, received_at_ms: u64) {
        self.samples.push(Sample {
            received_at: received_at_ms,
            snapshot_seq: decoded.snapshot_seq,
            server_tick: decoded.server_tick,
            players: decoded.players.to_vec(),
        });
        if self.samples.len() > 2 {
            self.samples.remove(0);
        }
    }

    pub fn has_samples(&self) -> bool {
        !self.samples.is_empty()
    }

    /// Drop all buffered samples (connection reset)
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Render state for wall-clock `now_ms`: the target render time sits one
    /// interpolation delay in the past so there is (usually) a newer sample
    /// to interpolate towards.
    pub fn render_state(&self, now_ms: f64) -> Option<RenderState> {
        self.state_at(now_ms - INTERP_DELAY_MS)
    }

    /// Render state for an explicit target render time.
    /// `None` until the first snapshot has arrived.
    pub fn state_at(&self, target_ms: f64) -> Option<RenderState> {
        let (older, newer) = match self.samples.as_slice() {
            [] => return None,
            [only] => return Some(only.to_render()),
            [older, newer] => (older, newer),
            _ => unreachable!("buffer holds at most two samples"),
        };

        if target_ms <= older.received_at as f64 {
            return Some(older.to_render());
        }
        if target_ms >= newer.received_at as f64 {
            return Some(newer.to_render());
        }
        if older.players.len() != newer.players.len() {
            // Protocol anomaly; don't interpolate mismatched rosters.
            return Some(newer.to_render());
        }

        let span = (newer.received_at - older.received_at).max(1) as f64;
        let t = (target_ms - older.received_at as f64) / span;

        let players = older
            .players
            .iter()
            .zip(&newer.players)
            .map(|(p, q)| RenderPlayer {
                present: p.present,
                x: p.x as f64 + (q.x - p.x) as f64 * t,
                y: p.y as f64 + (q.y - p.y) as f64 * t,
                hp: q.hp,
                alive: q.alive,
                score: q.score,
                aim_dir: q.aim_dir,
                respawn_ticks: q.respawn_ticks,
                fire_cooldown_ticks: q.fire_cooldown_ticks,
            })
            .collect();

        Some(RenderState {
            snapshot_seq: newer.snapshot_seq,
            server_tick: newer.server_tick,
            players,
        })
    }
}
