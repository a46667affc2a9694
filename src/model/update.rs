//! Update declarations: strategy, lifecycle status, and rollout phases.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::device::Filter;

/// Lifecycle state of an update job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    /// Waiting for the scheduler to pick it up.
    Pending,
    /// Scheduled for future execution (time or connect trigger).
    Scheduled,
    /// Currently executing.
    InProgress,
    /// All device pushes finished without failures.
    Completed,
    /// Finished with at least one device failure, or the dispatch errored.
    Failed,
    /// Cancelled by the operator. Terminal.
    Cancelled,
    /// Reserved. The base scheduler never produces this state.
    Paused,
}

impl UpdateStatus {
    /// Stable string form, matching the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Pending => "pending",
            UpdateStatus::Scheduled => "scheduled",
            UpdateStatus::InProgress => "in_progress",
            UpdateStatus::Completed => "completed",
            UpdateStatus::Failed => "failed",
            UpdateStatus::Cancelled => "cancelled",
            UpdateStatus::Paused => "paused",
        }
    }

    /// True for states with no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpdateStatus::Completed | UpdateStatus::Failed | UpdateStatus::Cancelled
        )
    }
}

/// Policy by which an update is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStrategy {
    /// Push to all matched devices at the next tick.
    Immediate,
    /// Execute at `scheduled_at`, inside the update window.
    Scheduled,
    /// Gradual rollout in declared phases.
    Progressive,
    /// Deliver when the device next connects. Requires an external
    /// connectivity signal; the clock never triggers it.
    OnConnect,
}

impl UpdateStrategy {
    /// Stable string form, matching the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStrategy::Immediate => "immediate",
            UpdateStrategy::Scheduled => "scheduled",
            UpdateStrategy::Progressive => "progressive",
            UpdateStrategy::OnConnect => "on_connect",
        }
    }
}

/// One step of a progressive rollout.
///
/// Phases are evaluated in declared order. A phase covers
/// `max(1, floor(total * percentage / 100))` devices, clamped so the
/// cumulative count never exceeds the target set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutPhase {
    /// Phase name ("canary", "wave-2").
    #[serde(default)]
    pub name: String,
    /// Percentage of the target set covered by this phase, 1..=100.
    pub percentage: u8,
    /// Pause after the phase before the next one starts. Ignored on the
    /// last phase.
    #[serde(default)]
    pub wait_time: Duration,
    /// Minimum completion percentage (0..=100) required to proceed to the
    /// next phase. Zero disables the gate.
    #[serde(default)]
    pub success_rate: u8,
}

/// A declared intent to deliver one payload to a filtered set of devices
/// under a stated strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    /// Unique update identifier (unique within one scheduler).
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// How to roll the update out.
    pub strategy: UpdateStrategy,
    /// Dynamic device selection. Required for updates handed to the
    /// rollout engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    /// Where the payload lives. Informational: the engine receives
    /// payloads as a factory, never by fetching this field. The hosted
    /// surface uses it to construct one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_url: Option<String>,
    /// When to execute. Required for [`UpdateStrategy::Scheduled`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Start of the permitted execution window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start: Option<DateTime<Utc>>,
    /// End of the permitted execution window (exclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_end: Option<DateTime<Utc>>,
    /// Phases for [`UpdateStrategy::Progressive`]; must be non-empty for
    /// that strategy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollout_phases: Vec<RolloutPhase>,
    /// When the update was declared.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Update {
    /// Creates an update targeting `filter` with the given strategy.
    pub fn new(id: impl Into<String>, strategy: UpdateStrategy, filter: Filter) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            strategy,
            filter: Some(filter),
            payload_url: None,
            scheduled_at: None,
            window_start: None,
            window_end: None,
            rollout_phases: Vec::new(),
            created_at: Utc::now(),
        }
    }
}
