//! Key layout for the shared store
//!
//! Every key the server touches is built here so the layout lives in one
//! place. Keys are hierarchical segment lists, matching the store's
//! prefix-free key space.

pub type Key = Vec<String>;

pub fn meta_key(match_id: &str) -> Key {
    vec!["match".into(), match_id.into(), "meta".into()]
}

pub fn leader_key(match_id: &str) -> Key {
    vec!["match".into(), match_id.into(), "leader".into()]
}

pub fn snapshot_key(match_id: &str) -> Key {
    vec!["match".into(), match_id.into(), "snapshot".into()]
}

pub fn input_key(match_id: &str, slot: usize) -> Key {
    vec![
        "match".into(),
        match_id.into(),
        "input".into(),
        slot.to_string(),
    ]
}

pub fn player_key(match_id: &str, slot: usize) -> Key {
    vec![
        "match".into(),
        match_id.into(),
        "players".into(),
        slot.to_string(),
    ]
}

pub fn matchmaking_open_key() -> Key {
    vec!["matchmaking".into(), "open".into()]
}
