//! WebSocket transport: per-match snapshot relay and input ingestion

pub mod handler;
pub mod protocol;
pub mod room;

pub use room::RoomManager;
