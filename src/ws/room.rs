//! Per-match snapshot relay
//!
//! One room per match per instance: a background task watches the match's
//! snapshot key and fans the raw bytes out to every connected socket. The
//! room also remembers the latest frame so a late joiner sees the world
//! immediately instead of waiting out a snapshot interval.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::store::keys::snapshot_key;
use crate::store::models::SnapshotRecord;
use crate::store::KvStore;

/// Registry of rooms on this instance
pub struct RoomManager {
    store: KvStore,
    rooms: DashMap<String, Arc<MatchRoom>>,
}

impl RoomManager {
    pub fn new(store: KvStore) -> Self {
        Self {
            store,
            rooms: DashMap::new(),
        }
    }

    /// Get or create the room for a match, starting its relay on first use
    pub fn get(&self, match_id: &str) -> Arc<MatchRoom> {
        if let Some(room) = self.rooms.get(match_id) {
            return room.clone();
        }
        let room = MatchRoom::start(self.store.clone(), match_id);
        self.rooms.insert(match_id.to_string(), room.clone());
        room
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }
}

/// Fan-out point for one match's snapshot stream
pub struct MatchRoom {
    match_id: String,
    snapshots: broadcast::Sender<Bytes>,
    last_snapshot: Mutex<Option<Bytes>>,
    connections: Arc<AtomicUsize>,
}

impl MatchRoom {
    fn start(store: KvStore, match_id: &str) -> Arc<Self> {
        let (snapshots, _) = broadcast::channel(64);
        let room = Arc::new(Self {
            match_id: match_id.to_string(),
            snapshots,
            last_snapshot: Mutex::new(None),
            connections: Arc::new(AtomicUsize::new(0)),
        });

        let relay = room.clone();
        let mut watch = store.watch(vec![snapshot_key(match_id)]);
        tokio::spawn(async move {
            while let Some(batch) = watch.next().await {
                let record = match batch[0].decode::<SnapshotRecord>() {
                    Ok(Some(record)) => record,
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(match_id = %relay.match_id, %err, "undecodable snapshot record");
                        continue;
                    }
                };
                let bytes = Bytes::from(record.bytes);
                *relay.last_snapshot.lock() = Some(bytes.clone());
                // No receivers is fine; the room may be ahead of its sockets.
                let _ = relay.snapshots.send(bytes);
            }
            debug!(match_id = %relay.match_id, "snapshot relay stopped");
        });

        room
    }

    /// Subscribe to the raw snapshot stream
    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.snapshots.subscribe()
    }

    /// Latest frame seen by this room, for replay on connect
    pub fn last_snapshot(&self) -> Option<Bytes> {
        self.last_snapshot.lock().clone()
    }

    /// Local subscriber gauge, shared with the match's coordinator
    pub fn connection_gauge(&self) -> Arc<AtomicUsize> {
        self.connections.clone()
    }

    pub fn add_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn remove_connection(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{encode_snapshot, MatchState};

    fn record(seq: u32, tick: u32) -> SnapshotRecord {
        let state = MatchState::new("m1");
        let bytes = encode_snapshot(seq, tick, &state.players);
        SnapshotRecord { seq, server_tick: tick, bytes: bytes.to_vec() }
    }

    #[tokio::test]
    async fn relay_broadcasts_persisted_snapshots() {
        let store = KvStore::new();
        let manager = RoomManager::new(store.clone());
        let room = manager.get("m1");
        let mut rx = room.subscribe();

        store.set(&snapshot_key("m1"), &record(1, 30)).await.unwrap();

        let bytes = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("relay delivered in time")
            .unwrap();
        let decoded = crate::game::decode_snapshot(&bytes).unwrap();
        assert_eq!(decoded.snapshot_seq, 1);
        assert_eq!(room.last_snapshot().unwrap(), bytes);
    }

    #[tokio::test]
    async fn rooms_are_created_once_per_match() {
        let store = KvStore::new();
        let manager = RoomManager::new(store);
        let a = manager.get("m1");
        let b = manager.get("m1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.active_rooms(), 1);
    }

    #[tokio::test]
    async fn connection_gauge_tracks_sockets() {
        let store = KvStore::new();
        let manager = RoomManager::new(store);
        let room = manager.get("m1");
        let gauge = room.connection_gauge();

        room.add_connection();
        room.add_connection();
        assert_eq!(gauge.load(Ordering::Relaxed), 2);
        room.remove_connection();
        assert_eq!(gauge.load(Ordering::Relaxed), 1);
    }
}
