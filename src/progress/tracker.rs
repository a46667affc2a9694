//! # In-memory progress tracker.
//!
//! ## Rules
//! - [`ProgressTracker::start`] creates a fresh record: counters at zero,
//!   `start_time = now`, no device entries.
//! - [`ProgressTracker::update_device`] adjusts aggregate counters for the
//!   transition from the device's previously recorded status (absent means
//!   no prior counter change) to the new one, and always adds the byte
//!   *delta* to both the device's and the update's cumulative totals.
//! - Entering a terminal status stamps the device's `end_time`.
//! - Operations on an unknown update id are silently ignored. The engine
//!   relies on this to never fail on late writes after cancellation.
//! - [`ProgressTracker::get`] returns an immutable snapshot.
//!
//! ## Estimation
//! `estimated_end` is defined once at least one device is terminal and at
//! least one is not: with `done = completed + failed`, the mean device
//! duration is `elapsed / done`, and the estimate is
//! `now + mean * (total - done)`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::RolloutError;
use crate::events::{Bus, Event, EventKind};
use crate::model::UpdateStatus;

/// Progress of a single device within one update execution.
#[derive(Debug, Clone)]
pub struct DeviceProgress {
    /// Device identifier.
    pub device_id: String,
    /// Last recorded status.
    pub status: UpdateStatus,
    /// Cumulative bytes pushed to this device.
    pub bytes_transferred: u64,
    /// When the first transition for this device was recorded.
    pub start_time: DateTime<Utc>,
    /// Set when the device reaches `completed` or `failed`.
    pub end_time: Option<DateTime<Utc>>,
    /// Failure description, when one was recorded.
    pub error: Option<String>,
}

/// Snapshot of one update's progress.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Update identifier.
    pub update_id: String,
    /// Size of the resolved target set.
    pub total_devices: usize,
    /// Devices that completed successfully.
    pub completed: usize,
    /// Devices that failed.
    pub failed: usize,
    /// Devices currently in flight.
    pub in_progress: usize,
    /// Cumulative bytes across all devices.
    pub bytes_transferred: u64,
    /// When tracking started.
    pub start_time: DateTime<Utc>,
    /// When [`ProgressTracker::complete`] stamped the update.
    pub end_time: Option<DateTime<Utc>>,
    /// Estimated completion time, when derivable.
    pub estimated_end: Option<DateTime<Utc>>,
    /// Per-device records.
    pub device_progress: HashMap<String, DeviceProgress>,
}

/// Internal mutable state for one update.
struct UpdateState {
    total_devices: usize,
    completed: usize,
    failed: usize,
    in_progress: usize,
    bytes_transferred: u64,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    devices: HashMap<String, DeviceProgress>,
}

/// Thread-safe in-memory progress tracker.
pub struct ProgressTracker {
    updates: RwLock<HashMap<String, UpdateState>>,
    publisher: Option<Bus>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Creates a tracker without event publishing.
    pub fn new() -> Self {
        Self {
            updates: RwLock::new(HashMap::new()),
            publisher: None,
        }
    }

    /// Creates a tracker that emits a `progress.update` event for every
    /// recorded device transition.
    pub fn with_publisher(bus: Bus) -> Self {
        Self {
            updates: RwLock::new(HashMap::new()),
            publisher: Some(bus),
        }
    }

    /// Begins tracking `update_id` over `total_devices` targets.
    ///
    /// A second `start` for the same id replaces the record; the engine
    /// only issues one per execution.
    pub async fn start(&self, update_id: &str, total_devices: usize) {
        let mut updates = self.updates.write().await;
        updates.insert(
            update_id.to_string(),
            UpdateState {
                total_devices,
                completed: 0,
                failed: 0,
                in_progress: 0,
                bytes_transferred: 0,
                start_time: Utc::now(),
                end_time: None,
                devices: HashMap::new(),
            },
        );
    }

    /// Records a status transition and byte delta for one device.
    pub async fn update_device(
        &self,
        update_id: &str,
        device_id: &str,
        status: UpdateStatus,
        bytes_delta: u64,
    ) {
        let mut updates = self.updates.write().await;
        let Some(state) = updates.get_mut(update_id) else {
            return;
        };

        let prior = state.devices.get(device_id).map(|d| d.status);
        match prior {
            Some(UpdateStatus::InProgress) => state.in_progress -= 1,
            Some(UpdateStatus::Completed) => state.completed -= 1,
            Some(UpdateStatus::Failed) => state.failed -= 1,
            _ => {}
        }

        let device = state
            .devices
            .entry(device_id.to_string())
            .or_insert_with(|| DeviceProgress {
                device_id: device_id.to_string(),
                status,
                bytes_transferred: 0,
                start_time: Utc::now(),
                end_time: None,
                error: None,
            });

        match status {
            UpdateStatus::InProgress => state.in_progress += 1,
            UpdateStatus::Completed => {
                state.completed += 1;
                device.end_time = Some(Utc::now());
            }
            UpdateStatus::Failed => {
                state.failed += 1;
                device.end_time = Some(Utc::now());
            }
            _ => {}
        }

        device.status = status;
        device.bytes_transferred += bytes_delta;
        state.bytes_transferred += bytes_delta;
        drop(updates);

        if let Some(bus) = &self.publisher {
            bus.publish(
                Event::now(EventKind::ProgressUpdate, update_id)
                    .with_device(device_id)
                    .with_status(status)
                    .with_bytes(bytes_delta),
            );
        }
    }

    /// Attaches a failure description to a device record. A no-op when
    /// either the update or the device is unknown.
    pub async fn set_device_error(&self, update_id: &str, device_id: &str, error: &str) {
        let mut updates = self.updates.write().await;
        if let Some(state) = updates.get_mut(update_id) {
            if let Some(device) = state.devices.get_mut(device_id) {
                device.error = Some(error.to_string());
            }
        }
    }

    /// Stamps the update's end time. Counters are untouched.
    pub async fn complete(&self, update_id: &str) {
        let mut updates = self.updates.write().await;
        if let Some(state) = updates.get_mut(update_id) {
            state.end_time = Some(Utc::now());
        }
    }

    /// Returns an immutable snapshot of one update's progress.
    pub async fn get(&self, update_id: &str) -> Result<Progress, RolloutError> {
        let updates = self.updates.read().await;
        let state = updates.get(update_id).ok_or_else(|| RolloutError::NotFound {
            id: update_id.to_string(),
        })?;

        let done = state.completed + state.failed;
        let estimated_end = if done > 0 && done < state.total_devices {
            let now = Utc::now();
            let mean = (now - state.start_time) / done as i32;
            let remaining = (state.total_devices - done) as i32;
            Some(now + mean * remaining)
        } else {
            None
        };

        Ok(Progress {
            update_id: update_id.to_string(),
            total_devices: state.total_devices,
            completed: state.completed,
            failed: state.failed,
            in_progress: state.in_progress,
            bytes_transferred: state.bytes_transferred,
            start_time: state.start_time,
            end_time: state.end_time,
            estimated_end,
            device_progress: state.devices.clone(),
        })
    }

    /// True when a record exists for `update_id`.
    pub async fn contains(&self, update_id: &str) -> bool {
        self.updates.read().await.contains_key(update_id)
    }
}
