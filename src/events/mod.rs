//! Lifecycle events: types, subscribers, and the fan-out bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`]: classification and payload metadata
//! - [`Subscribe`]: the extension point for event consumers
//! - [`Bus`]: per-kind registration with non-blocking fan-out
//!
//! ## Quick reference
//! - **Publishers**: the rollout engine (`update.started`, `device.*`,
//!   `update.completed`), the scheduler (`update.failed`,
//!   `update.cancelled`), and the progress tracker (`progress.update`
//!   when constructed with a publisher).
//! - **Consumers**: anything implementing [`Subscribe`], registered via
//!   [`Bus::subscribe`] or [`Bus::subscribe_all`].

mod bus;
mod event;
mod subscriber;

pub use bus::Bus;
pub use event::{Event, EventKind};
pub use subscriber::Subscribe;
