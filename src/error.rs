//! # Error types used across the fleetvisor runtime.
//!
//! Four enums cover the error taxonomy:
//!
//! - [`DeliveryError`]: outcomes of pushing a payload to one device. The
//!   single place where transport failures are classified as retryable or
//!   not (see [`DeliveryError::is_retryable`]).
//! - [`RegistryError`]: device store failures (lookups, duplicates, storage).
//! - [`RolloutError`]: errors raised by the rollout engine for a whole
//!   update execution (validation, empty target set, unknown update).
//! - [`ScheduleError`]: errors raised by the scheduler's public operations.
//!
//! All enums provide `as_label()`: a short stable snake_case label for
//! logs and metrics.

use std::time::Duration;

use thiserror::Error;

/// Errors produced while delivering a payload to a single device.
///
/// Retry classification lives here and nowhere else: the [`Delivery`]
/// implementation maps transport outcomes onto these variants, and the
/// retry policy consults [`is_retryable`](DeliveryError::is_retryable).
///
/// [`Delivery`]: crate::delivery::Delivery
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Network-level failure (connect, read, write, 5xx-equivalent). Retryable.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// The operation exceeded its per-request timeout. Retryable.
    #[error("timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The device rejected the push (4xx-equivalent, auth, validation).
    /// Never retried.
    #[error("rejected by device (no retry): {reason}")]
    Rejected { reason: String },

    /// The payload source could not be opened or rewound. Never retried.
    #[error("payload stream error: {reason}")]
    Payload { reason: String },

    /// The cancel token fired.
    ///
    /// Not an error in the traditional sense; signals cooperative shutdown.
    #[error("delivery cancelled")]
    Cancelled,
}

impl DeliveryError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            DeliveryError::Transport { .. } => "delivery_transport",
            DeliveryError::Timeout { .. } => "delivery_timeout",
            DeliveryError::Rejected { .. } => "delivery_rejected",
            DeliveryError::Payload { .. } => "delivery_payload",
            DeliveryError::Cancelled => "delivery_cancelled",
        }
    }

    /// Indicates whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryError::Transport { .. } | DeliveryError::Timeout { .. }
        )
    }

    /// True if this failure was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeliveryError::Cancelled)
    }

    /// Shorthand for a retryable transport failure.
    pub fn transport(reason: impl Into<String>) -> Self {
        DeliveryError::Transport {
            reason: reason.into(),
        }
    }

    /// Shorthand for a non-retryable rejection.
    pub fn rejected(reason: impl Into<String>) -> Self {
        DeliveryError::Rejected {
            reason: reason.into(),
        }
    }
}

/// Errors produced by a device registry backend.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No device with the given id.
    #[error("device '{id}' not found")]
    NotFound { id: String },

    /// A device with the given id is already registered.
    #[error("device '{id}' already registered")]
    AlreadyExists { id: String },

    /// The device record violates an invariant (empty id or address).
    #[error("invalid device: {reason}")]
    Invalid { reason: String },

    /// Backend storage failure (I/O, SQL).
    #[error("storage error: {reason}")]
    Storage { reason: String },
}

impl RegistryError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::NotFound { .. } => "registry_not_found",
            RegistryError::AlreadyExists { .. } => "registry_already_exists",
            RegistryError::Invalid { .. } => "registry_invalid",
            RegistryError::Storage { .. } => "registry_storage",
        }
    }
}

/// Errors produced by the rollout engine for a whole update execution.
///
/// Per-device push failures are *not* errors at this level: they are
/// recorded in the progress tracker and surfaced through the aggregate
/// [`Status`](crate::model::Status).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RolloutError {
    /// The update violates a documented invariant (empty id, missing filter).
    #[error("invalid update: {reason}")]
    Validation { reason: String },

    /// The update's filter matched no devices.
    #[error("no devices match the filter")]
    NoDevices,

    /// No progress record exists for the given update id.
    #[error("update '{id}' not found")]
    NotFound { id: String },

    /// The registry failed while resolving the target set.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A progressive phase finished below its required success rate;
    /// the remaining phases were aborted.
    #[error("phase '{phase}' below success rate: {achieved}% < {required}%")]
    PhaseGate {
        phase: String,
        achieved: u8,
        required: u8,
    },

    /// A bug in the engine itself (e.g. the worker pool refused a task).
    /// Should never reach users.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl RolloutError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            RolloutError::Validation { .. } => "rollout_validation",
            RolloutError::NoDevices => "rollout_no_devices",
            RolloutError::NotFound { .. } => "rollout_not_found",
            RolloutError::Registry(_) => "rollout_registry",
            RolloutError::PhaseGate { .. } => "rollout_phase_gate",
            RolloutError::Internal { .. } => "rollout_internal",
        }
    }

    /// Shorthand for a validation failure.
    pub fn validation(reason: impl Into<String>) -> Self {
        RolloutError::Validation {
            reason: reason.into(),
        }
    }
}

/// Errors produced by the scheduler's public operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// `schedule` was called with an empty update id.
    #[error("update id is required")]
    MissingId,

    /// An update with this id is already tracked.
    #[error("update '{id}' already scheduled")]
    AlreadyScheduled { id: String },

    /// No tracked update with this id.
    #[error("update '{id}' not found")]
    NotFound { id: String },

    /// `strategy = scheduled` requires `scheduled_at`.
    #[error("scheduled strategy requires scheduled_at")]
    MissingScheduleTime,

    /// `strategy = progressive` requires a non-empty phase list.
    #[error("progressive strategy requires rollout phases")]
    MissingPhases,

    /// A rollout phase is malformed (percentage or success rate out of range).
    #[error("invalid rollout phase '{name}': {reason}")]
    InvalidPhase { name: String, reason: String },

    /// `start` was called while the tick loop is already running.
    #[error("scheduler already running")]
    AlreadyRunning,

    /// `stop` was called while the tick loop is not running.
    #[error("scheduler not running")]
    NotRunning,
}

impl ScheduleError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ScheduleError::MissingId => "schedule_missing_id",
            ScheduleError::AlreadyScheduled { .. } => "schedule_already_scheduled",
            ScheduleError::NotFound { .. } => "schedule_not_found",
            ScheduleError::MissingScheduleTime => "schedule_missing_time",
            ScheduleError::MissingPhases => "schedule_missing_phases",
            ScheduleError::InvalidPhase { .. } => "schedule_invalid_phase",
            ScheduleError::AlreadyRunning => "scheduler_already_running",
            ScheduleError::NotRunning => "scheduler_not_running",
        }
    }
}
