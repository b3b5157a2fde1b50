//! Records persisted in the shared store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::MatchStatus;

/// Match metadata, written by matchmaking and the current leader
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMeta {
    pub status: MatchStatus,
    pub seed: u64,
    pub map_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    pub player_mask: u8,
}

/// Time-bounded claim over a match's simulation authority.
///
/// Validity is decided purely by comparing `lease_until` against the caller's
/// clock and `owner` against the caller's identity — no out-of-band signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderLease {
    pub owner: String,
    /// Absolute expiry, Unix milliseconds
    pub lease_until: u64,
}

/// A joined player's identity within a match
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub player_id: String,
    /// SHA-256 of the player token; the token itself is never stored
    pub token_hash: String,
    pub nickname: String,
    pub joined_at: DateTime<Utc>,
}

/// Last emitted snapshot, persisted for broadcast relay and leader handoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub seq: u32,
    pub server_tick: u32,
    pub bytes: Vec<u8>,
}
