//! # In-memory device registry.
//!
//! A `HashMap` behind a read/write lock. Listing snapshots the matched
//! set, sorts it by device id for a stable order, then paginates.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::RegistryError;
use crate::model::{Device, Filter};

use super::{validate, DeviceRegistry};

/// Map-backed registry for tests and embedders with their own storage.
#[derive(Default)]
pub struct MemoryRegistry {
    devices: RwLock<HashMap<String, Device>>,
}

impl MemoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with `devices`.
    ///
    /// Duplicates and invalid records are rejected just as through
    /// [`DeviceRegistry::add`].
    pub async fn with_devices(devices: Vec<Device>) -> Result<Self, RegistryError> {
        let registry = Self::new();
        for device in devices {
            registry.add(device).await?;
        }
        Ok(registry)
    }
}

#[async_trait]
impl DeviceRegistry for MemoryRegistry {
    async fn list(&self, filter: &Filter) -> Result<Vec<Device>, RegistryError> {
        let devices = self.devices.read().await;
        let mut matched: Vec<Device> = devices
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(filter.paginate(matched))
    }

    async fn get(&self, id: &str) -> Result<Device, RegistryError> {
        let devices = self.devices.read().await;
        devices
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })
    }

    async fn add(&self, device: Device) -> Result<(), RegistryError> {
        validate(&device)?;
        let mut devices = self.devices.write().await;
        if devices.contains_key(&device.id) {
            return Err(RegistryError::AlreadyExists {
                id: device.id.clone(),
            });
        }
        devices.insert(device.id.clone(), device);
        Ok(())
    }

    async fn update(&self, device: Device) -> Result<(), RegistryError> {
        validate(&device)?;
        let mut devices = self.devices.write().await;
        if !devices.contains_key(&device.id) {
            return Err(RegistryError::NotFound {
                id: device.id.clone(),
            });
        }
        devices.insert(device.id.clone(), device);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        let mut devices = self.devices.write().await;
        devices
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })
    }
}
