//! # fleetvisor
//!
//! **fleetvisor** pushes binary payloads (firmware, software images) to
//! fleets of networked devices under policy control: who gets what, when,
//! at what concurrency, with which delivery protocol, and how failures
//! and partial connectivity are handled.
//!
//! ## Features
//!
//! | Area             | Description                                                     | Key types / traits                        |
//! |------------------|-----------------------------------------------------------------|-------------------------------------------|
//! | **Engine**       | Execute one update with bounded concurrency, retry, and events. | [`RolloutEngine`], [`EngineConfig`]       |
//! | **Scheduling**   | Lifecycle states, strategies, windows, progressive phases.      | [`Scheduler`], [`SchedulerConfig`]        |
//! | **Events**       | Per-kind subscriptions with non-blocking fan-out.               | [`Bus`], [`Event`], [`Subscribe`]         |
//! | **Policies**     | Bounded exponential backoff with non-retryable tagging.         | [`RetryPolicy`], [`BackoffPolicy`]        |
//! | **Progress**     | Thread-safe counters, per-device records, ETA.                  | [`ProgressTracker`], [`Progress`]         |
//! | **Ports**        | Pluggable device store and transport.                           | [`DeviceRegistry`], [`Delivery`]          |
//! | **Payloads**     | Seekable sources, one per device task.                          | [`PayloadFactory`], [`BytesPayload`]      |
//! | **Errors**       | Typed taxonomy with retry classification.                       | [`DeliveryError`], [`RolloutError`]       |
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use fleetvisor::{
//!     BytesPayload, Device, DeviceRegistry, EngineConfig, Filter, HttpDelivery, MemoryRegistry,
//!     RolloutEngine, Update, UpdateStrategy,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(MemoryRegistry::new());
//!     registry.add(Device::new("d1", "http://10.0.0.17:8080")).await?;
//!
//!     let engine = RolloutEngine::new(
//!         EngineConfig::default(),
//!         registry,
//!         Arc::new(HttpDelivery::new()?),
//!     )?;
//!
//!     let update = Update::new("u1", UpdateStrategy::Immediate, Filter::default());
//!     let payload = Arc::new(BytesPayload::new(&b"firmware-image"[..]));
//!     engine
//!         .execute_update(&CancellationToken::new(), &update, payload)
//!         .await?;
//!
//!     let status = engine.get_status("u1").await?;
//!     println!("completed={} failed={}", status.completed, status.failed);
//!     Ok(())
//! }
//! ```
//!
//! Long-running deployments wrap the engine in a [`Scheduler`] (strategy
//! and window gating, progressive phases, cancellation) and optionally
//! expose the [`server`] JSON surface.

mod delivery;
mod engine;
mod error;
mod events;
mod model;
mod payload;
mod policies;
mod pool;
mod progress;
mod registry;
mod scheduler;

pub mod server;

// ---- Public re-exports ----

pub use delivery::{Delivery, HttpDelivery, HttpDeliveryConfig};
pub use engine::{EngineConfig, RolloutEngine};
pub use error::{DeliveryError, RegistryError, RolloutError, ScheduleError};
pub use events::{Bus, Event, EventKind, Subscribe};
pub use model::{
    Device, DeviceStatus, Filter, RolloutPhase, Status, Update, UpdateStatus, UpdateStrategy,
};
pub use payload::{BytesPayload, FilePayload, PayloadFactory, PayloadSource};
pub use policies::{BackoffPolicy, RetryPolicy};
pub use pool::{Job, PoolError, WorkerPool};
pub use progress::{DeviceProgress, Progress, ProgressTracker};
pub use registry::{DeviceRegistry, MemoryRegistry, SqliteRegistry};
pub use scheduler::{Scheduler, SchedulerConfig};
