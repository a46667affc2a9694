//! Device registry port and the bundled backends.
//!
//! [`DeviceRegistry`] is the capability set the rollout engine and
//! scheduler consume: filtered listing plus single-device CRUD. Backends
//! are passed in at construction; two reference implementations ship with
//! the crate:
//!
//! - [`MemoryRegistry`]: map behind a read/write lock, for tests and
//!   embedders with their own persistence.
//! - [`SqliteRegistry`]: single-file SQLite store for small deployments.

mod memory;
mod sqlite;

use async_trait::async_trait;

use crate::error::RegistryError;
use crate::model::{Device, Filter};

pub use memory::MemoryRegistry;
pub use sqlite::SqliteRegistry;

/// Device inventory port.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Returns devices matching the filter, paginated per
    /// `filter.offset` / `filter.limit`.
    async fn list(&self, filter: &Filter) -> Result<Vec<Device>, RegistryError>;

    /// Retrieves a single device by id.
    async fn get(&self, id: &str) -> Result<Device, RegistryError>;

    /// Registers a new device. Fails on duplicate ids and on records with
    /// an empty id or address.
    async fn add(&self, device: Device) -> Result<(), RegistryError>;

    /// Replaces an existing device record.
    async fn update(&self, device: Device) -> Result<(), RegistryError>;

    /// Removes a device.
    async fn delete(&self, id: &str) -> Result<(), RegistryError>;
}

/// Shared record validation for registry backends.
fn validate(device: &Device) -> Result<(), RegistryError> {
    if device.id.trim().is_empty() {
        return Err(RegistryError::Invalid {
            reason: "device id cannot be empty".into(),
        });
    }
    if device.address.trim().is_empty() {
        return Err(RegistryError::Invalid {
            reason: "device address cannot be empty".into(),
        });
    }
    Ok(())
}
