//! Per-match leader coordination
//!
//! Each match gets one coordinator task per server instance, looping
//! Idle → Attempting → Leading → Idle. The lease protocol in [`lease`]
//! decides which instance's coordinator actually simulates; everyone else
//! stays a follower and keeps retrying. Lease conflicts are routine, store
//! errors are retried with backoff — nothing in here is fatal.

pub mod lease;
pub mod session;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::store::KvStore;
use crate::util::time::unix_millis;

pub use session::SessionEnd;

/// Retry cadence while another instance holds the lease
const ATTEMPT_INTERVAL_MS: u64 = 750;
/// Slower cadence once the local room has no connections
const IDLE_ATTEMPT_INTERVAL_MS: u64 = 3_000;
/// Backoff cap for transient store failures
const MAX_BACKOFF_MS: u64 = 6_000;

struct CoordinatorHandle {
    shutdown: watch::Sender<bool>,
    connections: Arc<AtomicUsize>,
}

/// Owns one coordinator task per match on this instance
pub struct CoordinatorManager {
    store: KvStore,
    instance_id: String,
    coordinators: DashMap<String, CoordinatorHandle>,
}

impl CoordinatorManager {
    /// `instance_id` is the process-wide identity used as lease owner; build
    /// it once at startup and thread it through.
    pub fn new(store: KvStore, instance_id: String) -> Self {
        Self {
            store,
            instance_id,
            coordinators: DashMap::new(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Start coordinating a match if we aren't already. `connections` is the
    /// local subscriber gauge the session consults for idle release.
    pub fn ensure(&self, match_id: &str, connections: Arc<AtomicUsize>) {
        if self.coordinators.contains_key(match_id) {
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(attempt_loop(
            self.store.clone(),
            match_id.to_string(),
            self.instance_id.clone(),
            connections.clone(),
            shutdown_rx,
        ));

        self.coordinators.insert(
            match_id.to_string(),
            CoordinatorHandle {
                shutdown: shutdown_tx,
                connections,
            },
        );
        debug!(match_id, "coordinator started");
    }

    /// Stop coordinating a match. The shutdown signal lets the session stop
    /// its watch task and timers before the coordinator task exits, so no
    /// subscription outlives the coordinator.
    pub fn teardown(&self, match_id: &str) {
        if let Some((_, handle)) = self.coordinators.remove(match_id) {
            let _ = handle.shutdown.send(true);
            info!(match_id, "coordinator torn down");
        }
    }

    pub fn active_coordinators(&self) -> usize {
        self.coordinators.len()
    }

    pub fn total_connections(&self) -> usize {
        self.coordinators
            .iter()
            .map(|entry| entry.value().connections.load(Ordering::Relaxed))
            .sum()
    }
}

/// Idle → Attempting → Leading → Idle, forever (or until teardown)
async fn attempt_loop(
    store: KvStore,
    match_id: String,
    owner: String,
    connections: Arc<AtomicUsize>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff_ms = ATTEMPT_INTERVAL_MS;

    loop {
        if *shutdown.borrow() {
            return;
        }

        match lease::try_claim(&store, &match_id, &owner, unix_millis()).await {
            Ok(true) => {
                match session::run_leader_session(
                    &store,
                    &match_id,
                    &owner,
                    &connections,
                    &mut shutdown,
                )
                .await
                {
                    Ok(SessionEnd::Shutdown) => return,
                    Ok(_) => backoff_ms = ATTEMPT_INTERVAL_MS,
                    Err(err) => {
                        warn!(%match_id, %err, "leader session failed");
                        backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
                    }
                }
            }
            Ok(false) => {
                // Someone else leads; normal, stay a follower.
                backoff_ms = ATTEMPT_INTERVAL_MS;
            }
            Err(err) => {
                warn!(%match_id, %err, "lease acquisition errored");
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }

        let wait_ms = if connections.load(Ordering::Relaxed) == 0 {
            backoff_ms.max(IDLE_ATTEMPT_INTERVAL_MS)
        } else {
            backoff_ms
        };

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {}
            _ = shutdown.changed() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{decode_snapshot, MatchStatus};
    use crate::store::keys::{meta_key, snapshot_key};
    use crate::store::models::{MatchMeta, SnapshotRecord};

    fn waiting_meta(player_mask: u8) -> MatchMeta {
        MatchMeta {
            status: MatchStatus::Waiting,
            seed: 7,
            map_id: crate::game::map::MAP_ID.to_string(),
            created_at: chrono::Utc::now(),
            ends_at: None,
            player_mask,
        }
    }

    async fn wait_for_snapshot(store: &KvStore, match_id: &str) -> SnapshotRecord {
        for _ in 0..100 {
            if let Some(record) = store
                .get::<SnapshotRecord>(&snapshot_key(match_id))
                .await
                .unwrap()
                .value
            {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("no snapshot published");
    }

    #[tokio::test]
    async fn coordinator_ticks_and_publishes_snapshots() {
        let store = KvStore::new();
        store
            .set(&meta_key("m1"), &waiting_meta(0b0000_0011))
            .await
            .unwrap();

        let manager = CoordinatorManager::new(store.clone(), "test-instance".into());
        let connections = Arc::new(AtomicUsize::new(1));
        manager.ensure("m1", connections);

        let record = wait_for_snapshot(&store, "m1").await;
        assert!(record.server_tick > 0);
        let decoded = decode_snapshot(&record.bytes).unwrap();
        assert!(decoded.players[0].present);
        assert!(decoded.players[1].present);

        // Two present players: the simulation must have gone running and
        // published the transition.
        let meta = store
            .get::<MatchMeta>(&meta_key("m1"))
            .await
            .unwrap()
            .value
            .unwrap();
        assert_eq!(meta.status, MatchStatus::Running);

        manager.teardown("m1");
        assert_eq!(manager.active_coordinators(), 0);
    }

    #[tokio::test]
    async fn new_leader_resumes_from_persisted_snapshot() {
        let store = KvStore::new();
        store
            .set(&meta_key("m1"), &waiting_meta(0b0000_0001))
            .await
            .unwrap();

        // A previous leader left a snapshot at tick 5000, seq 600.
        let mut state = crate::game::MatchState::new("m1");
        state.apply_player_mask(0b0000_0001);
        state.players[0].score = 3;
        let bytes = crate::game::encode_snapshot(600, 5_000, &state.players);
        store
            .set(
                &snapshot_key("m1"),
                &SnapshotRecord { seq: 600, server_tick: 5_000, bytes: bytes.to_vec() },
            )
            .await
            .unwrap();

        let manager = CoordinatorManager::new(store.clone(), "successor".into());
        manager.ensure("m1", Arc::new(AtomicUsize::new(1)));

        let record = loop {
            let record = wait_for_snapshot(&store, "m1").await;
            if record.server_tick > 5_000 {
                break record;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        };

        assert!(record.seq > 600, "sequence continues, not reset");
        let decoded = decode_snapshot(&record.bytes).unwrap();
        assert_eq!(decoded.players[0].score, 3, "gameplay state carried over");

        manager.teardown("m1");
    }

    #[tokio::test]
    async fn only_one_of_two_instances_leads() {
        let store = KvStore::new();
        store
            .set(&meta_key("m1"), &waiting_meta(0b0000_0011))
            .await
            .unwrap();

        let a = CoordinatorManager::new(store.clone(), "instance-a".into());
        let b = CoordinatorManager::new(store.clone(), "instance-b".into());
        a.ensure("m1", Arc::new(AtomicUsize::new(1)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        b.ensure("m1", Arc::new(AtomicUsize::new(1)));

        wait_for_snapshot(&store, "m1").await;

        let lease = store
            .get::<crate::store::models::LeaderLease>(&crate::store::keys::leader_key("m1"))
            .await
            .unwrap()
            .value
            .unwrap();
        assert_eq!(lease.owner, "instance-a", "first claimer keeps the lease");

        a.teardown("m1");
        b.teardown("m1");
    }
}
