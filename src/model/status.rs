//! Aggregate, operator-facing view of one update.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::update::UpdateStatus;

/// Aggregate status of an update job, derived from progress tracking.
///
/// The overall `status` is `in_progress` while `completed + failed <
/// total_devices`, then `completed` if nothing failed, else `failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    /// Update identifier.
    pub update_id: String,
    /// Overall status.
    pub status: UpdateStatus,
    /// Total number of target devices.
    pub total_devices: usize,
    /// Devices that completed successfully.
    pub completed: usize,
    /// Devices that failed.
    pub failed: usize,
    /// Devices currently being pushed to.
    pub in_progress: usize,
    /// Per-device status, in string form.
    #[serde(default)]
    pub device_status: HashMap<String, String>,
    /// When the update started (or was recorded, for queued updates).
    pub started_at: DateTime<Utc>,
    /// Estimated completion time, when derivable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_end: Option<DateTime<Utc>>,
}

impl Status {
    /// A minimal status for updates the engine has not executed:
    /// zero counters, no device entries.
    pub fn queued(update_id: impl Into<String>, status: UpdateStatus, at: DateTime<Utc>) -> Self {
        Self {
            update_id: update_id.into(),
            status,
            total_devices: 0,
            completed: 0,
            failed: 0,
            in_progress: 0,
            device_status: HashMap::new(),
            started_at: at,
            estimated_end: None,
        }
    }
}
