//! Time utilities for the simulation and lease protocol

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Simulation tick rate. Part of the wire contract: every interoperating
/// implementation must run at exactly this rate.
pub const SERVER_TICK_HZ: u32 = 30;
/// Snapshot broadcast rate, strictly lower than the tick rate.
pub const SNAPSHOT_HZ: u32 = 12;
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / SERVER_TICK_HZ as u64;

/// Milliseconds elapsed after `ticks` simulation steps, rounded to nearest.
pub fn ticks_to_millis(ticks: u32) -> u64 {
    (ticks as u64 * 1000 + SERVER_TICK_HZ as u64 / 2) / SERVER_TICK_HZ as u64
}
