//! Shared key-value store: the coordination substrate between instances

pub mod keys;
pub mod kv;
pub mod models;

pub use keys::Key;
pub use kv::{KvStore, KvWatch, StoreError, Versioned, WatchEntry};
