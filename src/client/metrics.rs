//! Incoming snapshot metrics
//!
//! Tracks receipt times of the last few snapshots to estimate the effective
//! snapshot rate and expose staleness to the HUD. Sequence numbers are
//! recorded for display only — buffering never depends on them.

/// Receipt times retained for the rate estimate
const RATE_WINDOW: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct SnapshotMetrics {
    pub last_seq: u32,
    pub last_received_at: u64,
    recent_received_ats: Vec<u64>,
    pub snapshot_hz: f64,
}

impl SnapshotMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one received snapshot
    pub fn record(&mut self, snapshot_seq: u32, received_at_ms: u64) {
        if self.recent_received_ats.len() >= RATE_WINDOW {
            let excess = self.recent_received_ats.len() + 1 - RATE_WINDOW;
            self.recent_received_ats.drain(..excess);
        }
        self.recent_received_ats.push(received_at_ms);

        if let [first, .., last] = self.recent_received_ats.as_slice() {
            let span = last.saturating_sub(*first);
            if span > 0 {
                let intervals = (self.recent_received_ats.len() - 1) as f64;
                self.snapshot_hz = intervals * 1000.0 / span as f64;
            }
        }

        self.last_seq = snapshot_seq;
        self.last_received_at = received_at_ms;
    }

    /// Milliseconds since the last snapshot arrived
    pub fn lag_ms(&self, now_ms: u64) -> u64 {
        if self.last_received_at == 0 {
            return 0;
        }
        now_ms.saturating_sub(self.last_received_at)
    }
}
