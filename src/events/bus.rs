//! # Event bus with per-kind registration and non-blocking fan-out.
//!
//! [`Bus`] routes published [`Event`]s to the subscribers registered for
//! that event's kind. Dispatch is asynchronous and concurrent:
//!
//! ```text
//! publish(event)
//!     │  (try_send, never blocks)
//!     ├──► [queue] ──► worker ──► subscriber-A.on_event()
//!     │   (bounded)        └────► panic caught & logged
//!     └──► [queue] ──► worker ──► subscriber-B.on_event()
//!         (bounded)
//! ```
//!
//! ## Rules
//! - `publish` never blocks the caller on slow subscribers; when a queue
//!   is full the event is dropped for that subscriber only and a warning
//!   is logged.
//! - A failing (panicking) subscriber affects neither the publisher nor
//!   other subscribers.
//! - Per-subscription FIFO: each registration sees its events in publish
//!   order. [`Bus::subscribe_all`] uses a single queue, so one subscriber
//!   observing every kind also sees cross-kind publish order.
//! - No ordering is guaranteed *across* subscribers.
//!
//! Registration spawns the worker task, so it must happen inside a tokio
//! runtime.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::FutureExt;
use tokio::sync::mpsc;

use super::event::{Event, EventKind};
use super::subscriber::Subscribe;

/// One registered subscription: the handle publishers push into.
struct Route {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Routes events to per-kind subscriber queues.
///
/// Cheap to clone; clones share the subscriber table.
#[derive(Clone)]
pub struct Bus {
    routes: Arc<RwLock<HashMap<EventKind, Vec<Route>>>>,
    capacity: usize,
}

impl Bus {
    /// Creates a bus whose subscriber queues hold up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            routes: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Registers `subscriber` for one event kind.
    pub fn subscribe(&self, kind: EventKind, subscriber: Arc<dyn Subscribe>) {
        let name = subscriber.name();
        let tx = self.spawn_worker(subscriber);
        self.with_routes_mut(|routes| {
            routes.entry(kind).or_default().push(Route { name, tx });
        });
    }

    /// Registers `subscriber` for every event kind through a single queue,
    /// preserving publish order across kinds.
    pub fn subscribe_all(&self, subscriber: Arc<dyn Subscribe>) {
        let name = subscriber.name();
        let tx = self.spawn_worker(subscriber);
        self.with_routes_mut(|routes| {
            for kind in EventKind::ALL {
                routes.entry(kind).or_default().push(Route {
                    name,
                    tx: tx.clone(),
                });
            }
        });
    }

    /// Publishes an event to all subscribers registered for its kind.
    ///
    /// Non-blocking: full or closed queues drop the event for that
    /// subscriber and log a warning.
    pub fn publish(&self, event: Event) {
        let event = Arc::new(event);
        let routes = match self.routes.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(targets) = routes.get(&event.kind) else {
            return;
        };
        for route in targets {
            match route.tx.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!(
                        "event bus: dropping {} for subscriber '{}' (queue full)",
                        event.kind.as_str(),
                        route.name
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::warn!(
                        "event bus: dropping {} for subscriber '{}' (worker gone)",
                        event.kind.as_str(),
                        route.name
                    );
                }
            }
        }
    }

    /// Spawns the dedicated worker for one subscription and returns its
    /// queue handle. The worker isolates subscriber panics.
    fn spawn_worker(&self, subscriber: Arc<dyn Subscribe>) -> mpsc::Sender<Arc<Event>> {
        let (tx, mut rx) = mpsc::channel::<Arc<Event>>(self.capacity);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let fut = subscriber.on_event(event.as_ref());
                if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                    let info = if let Some(msg) = panic_err.downcast_ref::<&'static str>() {
                        (*msg).to_string()
                    } else if let Some(msg) = panic_err.downcast_ref::<String>() {
                        msg.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    log::warn!(
                        "event bus: subscriber '{}' panicked: {info}",
                        subscriber.name()
                    );
                }
            }
        });

        tx
    }

    fn with_routes_mut(&self, f: impl FnOnce(&mut HashMap<EventKind, Vec<Route>>)) {
        let mut routes = match self.routes.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut routes);
    }
}
