//! Arena Game Server
//!
//! Authoritative backend for a real-time 8-player arena shooter, plus the
//! client-side snapshot handling that turns its 12 Hz broadcast into smooth
//! motion:
//!
//! - `game` — deterministic 30 Hz simulation and the fixed-layout binary
//!   snapshot codec
//! - `store` — versioned key-value store with conditional writes and key
//!   watching, shared by all server instances
//! - `coordinator` — lease-based leader election; exactly one instance
//!   simulates a match at a time and hands off through persisted snapshots
//! - `client` — snapshot buffering/interpolation and the offline local
//!   simulation
//! - `matchmaking`, `ws`, `http` — join flow, snapshot relay transport and
//!   the HTTP surface around the core

pub mod app;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod game;
pub mod http;
pub mod matchmaking;
pub mod store;
pub mod util;
pub mod ws;

pub use app::AppState;
pub use config::Config;
