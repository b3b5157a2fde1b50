//! One leadership term: restore, watch, tick, publish
//!
//! A session owns the match simulation from a won lease until the lease is
//! lost, the match goes idle, or the coordinator is torn down. The tick loop
//! is the only writer of the in-memory `MatchState`; asynchronous store
//! notifications land in a bounded inbox that the loop drains by value at
//! the top of every tick.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::snapshot::{encode_snapshot, SnapshotCadence, SnapshotDecoded};
use crate::game::{decode_snapshot, step, MatchState, MatchStatus, PlayerInput, MAX_PLAYERS};
use crate::store::keys::{input_key, meta_key, snapshot_key};
use crate::store::models::{MatchMeta, SnapshotRecord};
use crate::store::{KvStore, StoreError, WatchEntry};
use crate::util::time::{unix_millis, TICK_DURATION_MICROS};

use super::lease::{self, LEADER_RENEW_EVERY_MS};

/// How long a leader keeps ticking a match with no local connections before
/// releasing the session (acquisition attempts continue at a slower cadence).
const IDLE_RELEASE_MS: u64 = 10_000;

/// Why a leader session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Renewal rejected — another instance owns the match now
    LeaseLost,
    /// No local connections for a while; stop ticking, retry slowly
    Idle,
    /// Coordinator torn down
    Shutdown,
    /// Match has no metadata yet, nothing to simulate
    NoMatch,
}

/// Fold a persisted snapshot into a freshly built state. Presence always
/// comes from the live player mask, not from the (older) snapshot.
pub(crate) fn restore_from_snapshot(state: &mut MatchState, decoded: &SnapshotDecoded) {
    state.tick = decoded.server_tick;
    state.snapshot_seq = decoded.snapshot_seq;
    for (slot, snap) in decoded.players.iter().enumerate() {
        let present = state.players[slot].present;
        state.players[slot] = *snap;
        state.players[slot].present = present;
    }
}

pub(crate) async fn run_leader_session(
    store: &KvStore,
    match_id: &str,
    owner: &str,
    connections: &Arc<AtomicUsize>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd, StoreError> {
    let meta_entry = store.get::<MatchMeta>(&meta_key(match_id)).await?;
    let Some(mut meta) = meta_entry.value else {
        return Ok(SessionEnd::NoMatch);
    };

    let mut state = MatchState::new(match_id);
    state.apply_published_status(meta.status);
    state.apply_player_mask(meta.player_mask);

    // Resume from the last persisted snapshot rather than a zero state; a
    // malformed record is ignored and the match restarts from the metadata.
    let snapshot_entry = store.get::<SnapshotRecord>(&snapshot_key(match_id)).await?;
    if let Some(record) = snapshot_entry.value {
        match decode_snapshot(&record.bytes) {
            Ok(decoded) => restore_from_snapshot(&mut state, &decoded),
            Err(err) => warn!(match_id, %err, "ignoring malformed persisted snapshot"),
        }
    }

    // Watch match metadata and all input slots; a background task forwards
    // batches into the inbox the tick loop drains.
    let mut watch_keys = vec![meta_key(match_id)];
    for slot in 0..MAX_PLAYERS {
        watch_keys.push(input_key(match_id, slot));
    }
    let (inbox_tx, mut inbox_rx) = mpsc::channel::<Vec<WatchEntry>>(32);
    let mut kv_watch = store.watch(watch_keys);
    let watch_task = tokio::spawn(async move {
        while let Some(batch) = kv_watch.next().await {
            if inbox_tx.send(batch).await.is_err() {
                break;
            }
        }
    });

    let mut inputs = [PlayerInput::default(); MAX_PLAYERS];
    let mut last_published_status = meta.status;
    let mut last_renew_at: u64 = unix_millis();
    let mut cadence = SnapshotCadence::new();
    let mut idle_since: Option<u64> = None;

    let mut tick_interval = interval(Duration::from_micros(TICK_DURATION_MICROS));
    tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(match_id, owner, tick = state.tick, "leading match");

    let end = loop {
        tokio::select! {
            _ = tick_interval.tick() => {}
            _ = shutdown.changed() => break SessionEnd::Shutdown,
        }
        if *shutdown.borrow() {
            break SessionEnd::Shutdown;
        }

        // Drain the inbox: newest metadata and per-slot inputs win.
        while let Ok(batch) = inbox_rx.try_recv() {
            apply_watch_batch(
                &batch,
                &mut state,
                &mut meta,
                &mut inputs,
                &mut last_published_status,
                match_id,
            );
        }

        let now = unix_millis();
        if now.saturating_sub(last_renew_at) >= LEADER_RENEW_EVERY_MS {
            last_renew_at = now;
            match lease::try_renew(store, match_id, owner, now).await {
                Ok(true) => {}
                Ok(false) => break SessionEnd::LeaseLost,
                Err(err) => {
                    // Can't prove the lease is still ours; abandon and let
                    // the attempt loop back off.
                    warn!(match_id, %err, "lease renewal errored, abandoning leadership");
                    break SessionEnd::LeaseLost;
                }
            }
        }

        step(&mut state, &inputs);

        if state.status != last_published_status {
            meta.status = state.status;
            meta.player_mask = state.player_mask;
            if state.status == MatchStatus::Ended {
                meta.ends_at = Some(Utc::now());
            }
            if let Err(err) = store.set(&meta_key(match_id), &meta).await {
                warn!(match_id, %err, "failed to publish match status");
            } else {
                info!(match_id, status = ?state.status, "match status changed");
                last_published_status = state.status;
            }
        }

        if cadence.should_emit() {
            state.snapshot_seq += 1;
            let bytes = encode_snapshot(state.snapshot_seq, state.tick, &state.players);
            let record = SnapshotRecord {
                seq: state.snapshot_seq,
                server_tick: state.tick,
                bytes: bytes.to_vec(),
            };
            if let Err(err) = store.set(&snapshot_key(match_id), &record).await {
                warn!(match_id, %err, "failed to persist snapshot");
            } else {
                debug!(match_id, seq = state.snapshot_seq, tick = state.tick, "snapshot published");
            }
        }

        if connections.load(Ordering::Relaxed) == 0 {
            let since = *idle_since.get_or_insert(now);
            if now.saturating_sub(since) >= IDLE_RELEASE_MS {
                break SessionEnd::Idle;
            }
        } else {
            idle_since = None;
        }
    };

    // Stop the watch before the next attempt cycle can start a new one.
    watch_task.abort();

    info!(match_id, owner, end = ?end, tick = state.tick, "leadership ended");
    Ok(end)
}

fn apply_watch_batch(
    batch: &[WatchEntry],
    state: &mut MatchState,
    meta: &mut MatchMeta,
    inputs: &mut [PlayerInput; MAX_PLAYERS],
    last_published_status: &mut MatchStatus,
    match_id: &str,
) {
    match batch[0].decode::<MatchMeta>() {
        Ok(Some(new_meta)) => {
            state.apply_published_status(new_meta.status);
            if new_meta.player_mask != state.player_mask {
                state.apply_player_mask(new_meta.player_mask);
            }
            *last_published_status = new_meta.status;
            *meta = new_meta;
        }
        Ok(None) => {}
        Err(err) => warn!(match_id, %err, "undecodable match metadata"),
    }

    for slot in 0..MAX_PLAYERS {
        match batch[1 + slot].decode::<PlayerInput>() {
            Ok(Some(input)) => inputs[slot] = input,
            // Expired or deleted input falls back to no-op.
            Ok(None) => inputs[slot] = PlayerInput::default(),
            Err(err) => warn!(match_id, slot, %err, "undecodable input record"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::PlayerState;

    #[test]
    fn restore_keeps_live_presence_over_snapshot_presence() {
        let mut state = MatchState::new("m1");
        state.apply_player_mask(0b0000_0011);

        let mut players = [PlayerState::default(); MAX_PLAYERS];
        players[0] = PlayerState {
            present: true,
            x: 321,
            y: 654,
            hp: 40,
            alive: true,
            score: 9,
            aim_dir: 5,
            respawn_ticks: 0,
            fire_cooldown_ticks: 2,
        };
        // Snapshot says slot 1 was absent, but the live mask has it present.
        let decoded = SnapshotDecoded {
            version: 1,
            snapshot_seq: 20,
            server_tick: 500,
            players,
        };

        restore_from_snapshot(&mut state, &decoded);

        assert_eq!(state.tick, 500);
        assert_eq!(state.snapshot_seq, 20);
        assert_eq!(state.players[0].x, 321);
        assert_eq!(state.players[0].score, 9);
        assert!(state.players[1].present, "presence comes from the live mask");
        assert!(!state.players[2].present);
    }
}
