//! Shared test harness: a scriptable mock delivery transport and an
//! event collector.
//!
//! Not every integration-test binary exercises every helper.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use fleetvisor::{
    Delivery, DeliveryError, Device, DeviceRegistry, Event, EventKind, MemoryRegistry,
    PayloadSource, Subscribe,
};

/// Per-device scripted outcome for [`MockDelivery`].
#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    /// Accept the payload.
    Succeed,
    /// Fail every attempt with a retryable transport error.
    Transient,
    /// Fail every attempt with a non-retryable rejection.
    Permanent,
    /// Fail the first `n` attempts with a transport error, then accept.
    Flaky(u32),
}

/// In-memory delivery transport with per-device behaviors, a transfer
/// delay, byte sinks, and attempt/concurrency accounting.
pub struct MockDelivery {
    delay: Duration,
    behaviors: Mutex<HashMap<String, Behavior>>,
    sinks: Mutex<HashMap<String, Vec<u8>>>,
    attempts: Mutex<HashMap<String, u32>>,
    bytes_read: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockDelivery {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Every push sleeps `delay` after consuming the payload, simulating
    /// transfer time.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            behaviors: Mutex::new(HashMap::new()),
            sinks: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            bytes_read: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn set_behavior(&self, device_id: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(device_id.to_string(), behavior);
    }

    pub fn attempts_for(&self, device_id: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(device_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn sink_for(&self, device_id: &str) -> Option<Vec<u8>> {
        self.sinks.lock().unwrap().get(device_id).cloned()
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    /// Total bytes consumed from payload sources across all attempts.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently in-flight pushes observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, device_id: &str) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(device_id)
            .copied()
            .unwrap_or(Behavior::Succeed)
    }

    async fn push_inner(
        &self,
        token: &CancellationToken,
        device: &Device,
        payload: &mut dyn PayloadSource,
        attempt: u32,
    ) -> Result<(), DeliveryError> {
        let mut received = Vec::new();
        payload
            .read_to_end(&mut received)
            .await
            .map_err(|e| DeliveryError::transport(format!("read payload: {e}")))?;
        self.bytes_read
            .fetch_add(received.len() as u64, Ordering::SeqCst);

        if !self.delay.is_zero() {
            let sleep = tokio::time::sleep(self.delay);
            tokio::pin!(sleep);
            tokio::select! {
                _ = &mut sleep => {}
                _ = token.cancelled() => return Err(DeliveryError::Cancelled),
            }
        }

        match self.behavior_for(&device.id) {
            Behavior::Succeed => {
                self.sinks
                    .lock()
                    .unwrap()
                    .insert(device.id.clone(), received);
                Ok(())
            }
            Behavior::Transient => Err(DeliveryError::transport("mock transport failure")),
            Behavior::Permanent => Err(DeliveryError::rejected("mock rejection")),
            Behavior::Flaky(failures) => {
                if attempt <= failures {
                    Err(DeliveryError::transport("mock flaky failure"))
                } else {
                    self.sinks
                        .lock()
                        .unwrap()
                        .insert(device.id.clone(), received);
                    Ok(())
                }
            }
        }
    }
}

#[async_trait]
impl Delivery for MockDelivery {
    async fn push(
        &self,
        token: &CancellationToken,
        device: &Device,
        payload: &mut dyn PayloadSource,
    ) -> Result<(), DeliveryError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let slot = attempts.entry(device.id.clone()).or_insert(0);
            *slot += 1;
            *slot
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let result = self.push_inner(token, device, payload, attempt).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Collects every event it sees, in delivery order.
pub struct EventCollector {
    events: Mutex<Vec<Event>>,
}

impl EventCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().unwrap().iter().filter(|e| e.kind == kind).count()
    }

    /// Events of one kind, in delivery order.
    pub fn of_kind(&self, kind: EventKind) -> Vec<Event> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Subscribe for EventCollector {
    async fn on_event(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn name(&self) -> &'static str {
        "event-collector"
    }
}

/// Builds a registry of `count` devices with ids `d1..d{count}`.
pub async fn seed_registry(count: usize) -> Arc<dyn DeviceRegistry> {
    let registry = Arc::new(MemoryRegistry::new());
    for i in 1..=count {
        let id = format!("d{i}");
        let mut device = Device::new(&id, format!("mock://{id}"));
        device.status = fleetvisor::DeviceStatus::Online;
        registry.add(device).await.expect("seed device");
    }
    registry
}

/// Lets queued event-bus workers drain before asserting on collectors.
pub async fn settle_events() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
