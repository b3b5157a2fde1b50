//! WebSocket control messages
//!
//! Control traffic is JSON; snapshots travel as separate raw binary frames
//! in the fixed layout from [`crate::game::snapshot`]. The tag strings and
//! field names are part of the wire contract.

use serde::{Deserialize, Serialize};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Re-introduction after connect; answered with another welcome
    ClientHello {
        match_id: String,
        player_id: String,
        token: String,
    },

    /// Input for the player's slot. Sent on change, not per tick.
    ClientInput {
        /// Client-side sequence number, for diagnostics only
        seq: u32,
        /// 0 = none, 1–8 = eight-way compass
        move_dir: i32,
        /// 0–15, sixteen-way compass
        aim_dir: i32,
        fire: bool,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Connection accepted; the client's slot in every snapshot
    ServerWelcome { slot: usize },

    /// Error message
    Error { code: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_input_uses_the_wire_field_names() {
        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"ClientInput","seq":7,"moveDir":3,"aimDir":12,"fire":true}"#,
        )
        .unwrap();
        match msg {
            ClientMsg::ClientInput { seq, move_dir, aim_dir, fire } => {
                assert_eq!((seq, move_dir, aim_dir, fire), (7, 3, 12, true));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn welcome_serializes_with_type_tag() {
        let json = serde_json::to_string(&ServerMsg::ServerWelcome { slot: 2 }).unwrap();
        assert_eq!(json, r#"{"type":"ServerWelcome","slot":2}"#);
    }
}
