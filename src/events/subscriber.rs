//! # Event subscriber trait.
//!
//! [`Subscribe`] is the extension point for plugging custom event
//! consumers into the bus. Each registration gets a dedicated worker task
//! and a bounded queue, so a slow or panicking subscriber never affects
//! publishers or other subscribers.
//!
//! ## Rules
//! - `on_event()` runs on the subscription's worker task, never in the
//!   publisher's context.
//! - Events arrive in publish order per subscription (FIFO queue).
//! - Queue overflow drops the event for this subscriber only.
//! - Panics are caught and logged; the worker keeps processing.
//! - Handlers are side-effect-only; nothing they return is consumed, and
//!   they must swallow their own errors.

use async_trait::async_trait;

use super::event::Event;

/// Asynchronous, isolated consumer of rollout events.
///
/// ```rust
/// use async_trait::async_trait;
/// use fleetvisor::{Event, EventKind, Subscribe};
///
/// struct FailureCounter;
///
/// #[async_trait]
/// impl Subscribe for FailureCounter {
///     async fn on_event(&self, event: &Event) {
///         if event.kind == EventKind::DeviceFailed {
///             // increment a metric, post an alert, ...
///         }
///     }
///
///     fn name(&self) -> &'static str {
///         "failure-counter"
///     }
/// }
/// ```
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    async fn on_event(&self, event: &Event);

    /// Subscriber name for overflow/panic log lines.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
