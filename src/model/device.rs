//! Device records and the selection filter evaluated against them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connectivity state of a device.
///
/// The status is advisory: it reflects the last observation, not a live
/// probe. The rollout engine does not exclude offline devices unless the
/// update's filter does so.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Currently connected and reachable.
    Online,
    /// Not currently reachable.
    Offline,
    /// Never seen, or status unclear.
    Unknown,
}

impl DeviceStatus {
    /// Stable string form, matching the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Unknown => "unknown",
        }
    }
}

/// A target device for updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Unique device identifier.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Network address (IP, hostname, URL). Must be non-empty for any
    /// device handed to a delivery transport.
    pub address: String,
    /// Last observed connectivity status.
    pub status: DeviceStatus,
    /// Last time the device was seen online.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    /// Firmware version currently running on the device.
    #[serde(default)]
    pub firmware_version: String,
    /// Physical location (store, region, rack).
    #[serde(default)]
    pub location: String,
    /// Free-form device metadata (tags, groups).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// When the device was registered.
    pub created_at: DateTime<Utc>,
    /// Last record modification.
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// Creates a device with the given identity and address, status
    /// `Unknown`, and registration timestamps set to now.
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: String::new(),
            address: address.into(),
            status: DeviceStatus::Unknown,
            last_seen: None,
            firmware_version: String::new(),
            location: String::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Selection criteria over the device registry.
///
/// All set criteria are conjunctive. An empty filter matches every device.
/// Firmware bands compare **lexically** (no semver parsing); callers that
/// need semantic ordering should encode versions accordingly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    /// Restrict to these device ids (no restriction when empty).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    /// Require this connectivity status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceStatus>,
    /// Require this exact location (no restriction when empty).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    /// Require `firmware_version >= min_firmware` (lexical).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub min_firmware: String,
    /// Require `firmware_version <= max_firmware` (lexical).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub max_firmware: String,
    /// Required metadata key/value pairs.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    /// Require `last_seen <= last_seen_before`. Devices that have never
    /// been seen pass this criterion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_before: Option<DateTime<Utc>>,
    /// Require `last_seen >= last_seen_after`. Devices that have never
    /// been seen pass this criterion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_after: Option<DateTime<Utc>>,
    /// Maximum number of devices to return (0 = unlimited).
    #[serde(default)]
    pub limit: usize,
    /// Pagination offset, applied after matching.
    #[serde(default)]
    pub offset: usize,
}

impl Filter {
    /// Restrict the filter to an explicit id set.
    pub fn for_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Evaluates the filter criteria against one device.
    ///
    /// Pagination (`limit`/`offset`) is applied by registries over the
    /// matched set, not here.
    pub fn matches(&self, device: &Device) -> bool {
        if !self.ids.is_empty() && !self.ids.iter().any(|id| *id == device.id) {
            return false;
        }
        if let Some(status) = self.status {
            if device.status != status {
                return false;
            }
        }
        if !self.location.is_empty() && device.location != self.location {
            return false;
        }
        if !self.min_firmware.is_empty() && device.firmware_version.as_str() < self.min_firmware.as_str() {
            return false;
        }
        if !self.max_firmware.is_empty() && device.firmware_version.as_str() > self.max_firmware.as_str() {
            return false;
        }
        for (key, value) in &self.metadata {
            if device.metadata.get(key) != Some(value) {
                return false;
            }
        }
        if let (Some(bound), Some(seen)) = (self.last_seen_before, device.last_seen) {
            if seen > bound {
                return false;
            }
        }
        if let (Some(bound), Some(seen)) = (self.last_seen_after, device.last_seen) {
            if seen < bound {
                return false;
            }
        }
        true
    }

    /// Applies `offset`/`limit` pagination to an already-matched set.
    pub fn paginate(&self, mut devices: Vec<Device>) -> Vec<Device> {
        if self.offset >= devices.len() {
            return Vec::new();
        }
        let mut devices = devices.split_off(self.offset);
        if self.limit > 0 && devices.len() > self.limit {
            devices.truncate(self.limit);
        }
        devices
    }
}
