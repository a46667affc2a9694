//! Per-update progress tracking: counters, per-device records, byte
//! accounting, and completion-time estimation.
//!
//! [`ProgressTracker`] is fully thread-safe (one lock over the map of
//! per-update states) and is shared between the rollout engine's device
//! tasks (writers) and status queries (readers).

mod tracker;

pub use tracker::{DeviceProgress, Progress, ProgressTracker};
