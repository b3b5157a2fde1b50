//! Client-side snapshot handling
//!
//! Everything a rendering client needs between "bytes arrived" and "where do
//! I draw this player": the reconciler buffers and interpolates network
//! snapshots, the local sim provides the offline fallback through the exact
//! same codec+simulator path, and metrics track the incoming snapshot rate.

pub mod local;
pub mod metrics;
pub mod reconciler;

pub use local::LocalSim;
pub use metrics::SnapshotMetrics;
pub use reconciler::Reconciler;
