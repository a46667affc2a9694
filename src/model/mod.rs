//! Domain model: devices, selection filters, updates, and aggregate status.
//!
//! These are plain serde-derived value types shared by every component.
//! Wire names mirror the struct field names; timestamps serialize as
//! RFC 3339 (chrono's serde default for `DateTime<Utc>`).
//!
//! ## Contents
//! - [`Device`], [`DeviceStatus`], [`Filter`]: the device inventory side
//! - [`Update`], [`UpdateStrategy`], [`UpdateStatus`], [`RolloutPhase`]:
//!   the rollout side
//! - [`Status`]: the aggregate, operator-facing view of one update

mod device;
mod status;
mod update;

pub use device::{Device, DeviceStatus, Filter};
pub use status::Status;
pub use update::{RolloutPhase, Update, UpdateStatus, UpdateStrategy};
