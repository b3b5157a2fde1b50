//! Slot-based matchmaking
//!
//! Joining is one conditional commit against the match metadata: claim the
//! first free slot bit, write the player record and a default input, and
//! flip the match to running once a second player is in. Losing the commit
//! just means someone else joined the same match first — rotate the open
//! pointer and try again.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::config::{INPUT_EXPIRE_IN_MS, MAX_NICKNAME_LENGTH};
use crate::game::{map::MAP_ID, MatchStatus, PlayerInput, MAX_PLAYERS};
use crate::store::keys::{input_key, matchmaking_open_key, meta_key, player_key};
use crate::store::models::{MatchMeta, PlayerRecord};
use crate::store::{KvStore, StoreError};

/// Joins racing for the same open match before giving up on it
const JOIN_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("no match slot available")]
    NoSlotAvailable,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Successful join: the token is returned exactly once and only its hash is
/// ever stored.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResult {
    pub match_id: String,
    pub player_id: String,
    pub player_token: String,
    pub slot: usize,
}

/// Place a player into the open match, or a fresh one
pub async fn join_match(store: &KvStore, nickname: &str) -> Result<JoinResult, MatchmakingError> {
    let nickname = sanitize_nickname(nickname);

    for _ in 0..JOIN_ATTEMPTS {
        let open = store.get::<String>(&matchmaking_open_key()).await?;
        let match_id = open.value.unwrap_or_else(create_match_id);

        if let Some(result) = try_join(store, &match_id, &nickname).await? {
            return Ok(result);
        }

        // That match is full, ended, or we lost the race: point the queue at
        // a fresh match for the next attempt.
        store
            .set(&matchmaking_open_key(), &create_match_id())
            .await?;
    }

    let match_id = create_match_id();
    try_join(store, &match_id, &nickname)
        .await?
        .ok_or(MatchmakingError::NoSlotAvailable)
}

async fn try_join(
    store: &KvStore,
    match_id: &str,
    nickname: &str,
) -> Result<Option<JoinResult>, MatchmakingError> {
    let meta_entry = store.get::<MatchMeta>(&meta_key(match_id)).await?;
    let meta = meta_entry.value.unwrap_or_else(new_meta);

    if meta.status == MatchStatus::Ended {
        return Ok(None);
    }
    let Some(slot) = first_free_slot(meta.player_mask) else {
        return Ok(None);
    };

    let player_id = format!("p{}_{}", slot, Uuid::new_v4());
    let player_token = format!("t_{}", Uuid::new_v4());

    let next_mask = meta.player_mask | (1 << slot);
    let next_status = if next_mask.count_ones() >= 2 {
        MatchStatus::Running
    } else {
        meta.status
    };
    let next_meta = MatchMeta {
        status: next_status,
        player_mask: next_mask,
        ..meta
    };

    let record = PlayerRecord {
        player_id: player_id.clone(),
        token_hash: hash_token(&player_token),
        nickname: nickname.to_string(),
        joined_at: Utc::now(),
    };

    let committed = store
        .atomic()
        .check(&meta_key(match_id), meta_entry.version)
        .set(&meta_key(match_id), &next_meta)?
        .set(&player_key(match_id, slot), &record)?
        .set_with_ttl(
            &input_key(match_id, slot),
            &PlayerInput::default(),
            INPUT_EXPIRE_IN_MS,
        )?
        .commit()
        .await?;

    if !committed {
        return Ok(None);
    }

    store.set(&matchmaking_open_key(), &match_id).await?;

    info!(match_id, slot, nickname, "player joined match");
    Ok(Some(JoinResult {
        match_id: match_id.to_string(),
        player_id,
        player_token,
        slot,
    }))
}

fn new_meta() -> MatchMeta {
    MatchMeta {
        status: MatchStatus::Waiting,
        seed: rand::thread_rng().gen_range(0..1_000_000_000),
        map_id: MAP_ID.to_string(),
        created_at: Utc::now(),
        ends_at: None,
        player_mask: 0,
    }
}

fn create_match_id() -> String {
    format!("m_{}", Uuid::new_v4())
}

fn first_free_slot(mask: u8) -> Option<usize> {
    (0..MAX_PLAYERS).find(|slot| mask & (1 << slot) == 0)
}

fn sanitize_nickname(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "player".to_string();
    }
    trimmed.chars().take(MAX_NICKNAME_LENGTH).collect()
}

/// Slot is embedded in the player id (`p<slot>_<uuid>`), so the socket
/// handler can find the player record without a scan.
pub fn parse_slot_from_player_id(player_id: &str) -> Option<usize> {
    let mut chars = player_id.chars();
    if chars.next()? != 'p' {
        return None;
    }
    let slot = chars.next()?.to_digit(10)? as usize;
    if chars.next()? != '_' {
        return None;
    }
    (slot < MAX_PLAYERS).then_some(slot)
}

/// URL-safe SHA-256 digest of a player token
pub fn hash_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_two_joins_fill_slots_and_start_the_match() {
        let store = KvStore::new();

        let first = join_match(&store, "alice").await.unwrap();
        assert_eq!(first.slot, 0);

        let meta = store
            .get::<MatchMeta>(&meta_key(&first.match_id))
            .await
            .unwrap()
            .value
            .unwrap();
        assert_eq!(meta.status, MatchStatus::Waiting);
        assert_eq!(meta.player_mask, 0b0000_0001);

        let second = join_match(&store, "bob").await.unwrap();
        assert_eq!(second.match_id, first.match_id);
        assert_eq!(second.slot, 1);

        let meta = store
            .get::<MatchMeta>(&meta_key(&first.match_id))
            .await
            .unwrap()
            .value
            .unwrap();
        assert_eq!(meta.status, MatchStatus::Running);
        assert_eq!(meta.player_mask, 0b0000_0011);
    }

    #[tokio::test]
    async fn ninth_player_rolls_over_to_a_new_match() {
        let store = KvStore::new();

        let first = join_match(&store, "p").await.unwrap();
        for _ in 1..MAX_PLAYERS {
            let joined = join_match(&store, "p").await.unwrap();
            assert_eq!(joined.match_id, first.match_id);
        }

        let overflow = join_match(&store, "late").await.unwrap();
        assert_ne!(overflow.match_id, first.match_id);
        assert_eq!(overflow.slot, 0);
    }

    #[tokio::test]
    async fn ended_match_is_never_joined() {
        let store = KvStore::new();
        let first = join_match(&store, "p").await.unwrap();

        let mut meta = store
            .get::<MatchMeta>(&meta_key(&first.match_id))
            .await
            .unwrap()
            .value
            .unwrap();
        meta.status = MatchStatus::Ended;
        store.set(&meta_key(&first.match_id), &meta).await.unwrap();

        let next = join_match(&store, "q").await.unwrap();
        assert_ne!(next.match_id, first.match_id);
    }

    #[tokio::test]
    async fn join_writes_the_token_hash_not_the_token() {
        let store = KvStore::new();
        let joined = join_match(&store, "alice").await.unwrap();

        let record = store
            .get::<PlayerRecord>(&player_key(&joined.match_id, joined.slot))
            .await
            .unwrap()
            .value
            .unwrap();
        assert_eq!(record.token_hash, hash_token(&joined.player_token));
        assert_ne!(record.token_hash, joined.player_token);
        assert_eq!(record.nickname, "alice");
    }

    #[test]
    fn player_id_slot_roundtrips() {
        assert_eq!(parse_slot_from_player_id("p3_abc-def"), Some(3));
        assert_eq!(parse_slot_from_player_id("p8_abc"), None);
        assert_eq!(parse_slot_from_player_id("x3_abc"), None);
        assert_eq!(parse_slot_from_player_id("p_abc"), None);
        assert_eq!(parse_slot_from_player_id(""), None);
    }

    #[test]
    fn nicknames_are_trimmed_and_bounded() {
        assert_eq!(sanitize_nickname("  alice  "), "alice");
        assert_eq!(sanitize_nickname(""), "player");
        assert_eq!(sanitize_nickname(&"x".repeat(40)).len(), MAX_NICKNAME_LENGTH);
    }
}
