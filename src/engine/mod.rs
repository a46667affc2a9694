//! The rollout engine: executes one update across its resolved target
//! set with bounded concurrency, retry, progress tracking, and lifecycle
//! events.
//!
//! ## Files & responsibilities
//! - **config.rs**: [`EngineConfig`]: pool size, retry policy, event
//!   buffer size, with validation.
//! - **rollout.rs**: [`RolloutEngine`]: target resolution, device-task
//!   fan-out through the worker pool, per-device retry with payload
//!   rewind, and the aggregate status query.
//!
//! ## Execution flow
//! ```text
//! execute_update(update, payload_factory, token)
//!   ├─ validate id + filter
//!   ├─ registry.list(filter)            (empty set fails the update)
//!   ├─ progress.start(); publish update.started
//!   ├─ WorkerPool::start(token)
//!   │    └─ per device: device task
//!   │         ├─ token cancelled? → return (no events)
//!   │         ├─ progress: in_progress; publish device.started
//!   │         ├─ retry { open/rewind source; delivery.push }
//!   │         └─ progress: completed/failed; publish device.*
//!   ├─ pool.stop()                      (drain)
//!   └─ progress.complete(); publish update.completed
//! ```

mod config;
mod rollout;

pub use config::EngineConfig;
pub use rollout::RolloutEngine;
