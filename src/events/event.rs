//! # Lifecycle events emitted during rollout execution.
//!
//! [`EventKind`] classifies events into update-level and device-level
//! transitions plus progress ticks. [`Event`] carries typed optional
//! metadata (counts, addresses, errors) with builder-style setters, and a
//! small string map as an extension slot for anything beyond the typed
//! fields.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically, so consumers can re-order events delivered through
//! concurrent queues. For one update, `update.started` precedes every
//! `device.*` event and `update.completed` follows every device terminal
//! event.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{UpdateStatus, UpdateStrategy};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of rollout events. Serialized forms match the wire
/// names returned by [`EventKind::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    // === Update lifecycle ===
    /// An update execution began (after target resolution).
    #[serde(rename = "update.started")]
    UpdateStarted,
    /// An update execution finished draining its device tasks.
    ///
    /// Emitted regardless of per-device outcomes; consumers classify by
    /// inspecting the final aggregate status.
    #[serde(rename = "update.completed")]
    UpdateCompleted,
    /// An update's dispatch returned an error.
    #[serde(rename = "update.failed")]
    UpdateFailed,
    /// An update was cancelled by the operator.
    #[serde(rename = "update.cancelled")]
    UpdateCancelled,

    // === Device lifecycle ===
    /// A device push task started.
    #[serde(rename = "device.started")]
    DeviceStarted,
    /// A device received the full payload.
    #[serde(rename = "device.completed")]
    DeviceCompleted,
    /// A device push exhausted its attempts or hit a permanent failure.
    #[serde(rename = "device.failed")]
    DeviceFailed,

    // === Progress ===
    /// A per-device progress transition was recorded.
    #[serde(rename = "progress.update")]
    ProgressUpdate,
}

impl EventKind {
    /// Every kind, in declaration order. Used by
    /// [`Bus::subscribe_all`](crate::events::Bus::subscribe_all).
    pub const ALL: [EventKind; 8] = [
        EventKind::UpdateStarted,
        EventKind::UpdateCompleted,
        EventKind::UpdateFailed,
        EventKind::UpdateCancelled,
        EventKind::DeviceStarted,
        EventKind::DeviceCompleted,
        EventKind::DeviceFailed,
        EventKind::ProgressUpdate,
    ];

    /// Stable wire name (`update.started`, `device.failed`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::UpdateStarted => "update.started",
            EventKind::UpdateCompleted => "update.completed",
            EventKind::UpdateFailed => "update.failed",
            EventKind::UpdateCancelled => "update.cancelled",
            EventKind::DeviceStarted => "device.started",
            EventKind::DeviceCompleted => "device.completed",
            EventKind::DeviceFailed => "device.failed",
            EventKind::ProgressUpdate => "progress.update",
        }
    }
}

/// A rollout event with typed optional metadata.
///
/// Constructed via [`Event::now`] and enriched with `with_*` builders:
///
/// ```rust
/// use fleetvisor::{Event, EventKind};
///
/// let ev = Event::now(EventKind::DeviceFailed, "u1")
///     .with_device("d42")
///     .with_error("connection refused");
///
/// assert_eq!(ev.kind, EventKind::DeviceFailed);
/// assert_eq!(ev.device_id.as_deref(), Some("d42"));
/// assert_eq!(ev.error.as_deref(), Some("connection refused"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: DateTime<Utc>,
    /// The kind of event.
    pub kind: EventKind,
    /// Update this event belongs to.
    pub update_id: String,
    /// Device, for `device.*` and `progress.update` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Error message, if the event represents a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Target-set size, on `update.started`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_devices: Option<usize>,
    /// Rollout strategy, on `update.started`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<UpdateStrategy>,
    /// Completed-device count, on `update.completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<usize>,
    /// Failed-device count, on `update.completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
    /// Push outcome flag, on `device.completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Device network address, on `device.started`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_address: Option<String>,
    /// Recorded device status, on `progress.update`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_status: Option<UpdateStatus>,
    /// Byte delta, on `progress.update`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    /// Extension slot for consumers that need more than the typed fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

impl Event {
    /// Creates an event of the given kind for `update_id`, stamped with
    /// the current time and the next sequence number.
    pub fn now(kind: EventKind, update_id: impl Into<String>) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: Utc::now(),
            kind,
            update_id: update_id.into(),
            device_id: None,
            error: None,
            total_devices: None,
            strategy: None,
            completed: None,
            failed: None,
            success: None,
            device_address: None,
            device_status: None,
            bytes: None,
            data: BTreeMap::new(),
        }
    }

    /// Attaches a device id.
    pub fn with_device(mut self, id: impl Into<String>) -> Self {
        self.device_id = Some(id.into());
        self
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }

    /// Attaches the target-set size.
    pub fn with_total(mut self, total: usize) -> Self {
        self.total_devices = Some(total);
        self
    }

    /// Attaches the rollout strategy.
    pub fn with_strategy(mut self, strategy: UpdateStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Attaches final completed/failed counts.
    pub fn with_counts(mut self, completed: usize, failed: usize) -> Self {
        self.completed = Some(completed);
        self.failed = Some(failed);
        self
    }

    /// Attaches the push outcome flag.
    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    /// Attaches the device network address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.device_address = Some(address.into());
        self
    }

    /// Attaches a recorded device status.
    pub fn with_status(mut self, status: UpdateStatus) -> Self {
        self.device_status = Some(status);
        self
    }

    /// Attaches a byte delta.
    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = Some(bytes);
        self
    }

    /// Inserts a key/value pair into the extension slot.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}
