//! # SQLite-backed device registry.
//!
//! Single-file store for small deployments (bundled SQLite, WAL mode).
//! Timestamps are stored as RFC 3339 text, device metadata as a JSON
//! column. Filtering is evaluated in process over the loaded rows (the
//! table is the source of truth, not an index), which is adequate for the
//! registry sizes this crate targets.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::RegistryError;
use crate::model::{Device, DeviceStatus, Filter};

use super::{validate, DeviceRegistry};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS devices (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    address          TEXT NOT NULL,
    status           TEXT NOT NULL,
    last_seen        TEXT,
    firmware_version TEXT NOT NULL,
    location         TEXT NOT NULL,
    metadata         TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_devices_status ON devices(status);
CREATE INDEX IF NOT EXISTS idx_devices_location ON devices(location);
";

/// SQLite device registry.
pub struct SqliteRegistry {
    conn: Mutex<Connection>,
}

impl SqliteRegistry {
    /// Opens (or creates) the database at `path` and applies the schema.
    pub fn open(path: &Path) -> Result<Self, RegistryError> {
        let conn = Connection::open(path).map_err(storage)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").map_err(storage)?;
        conn.execute_batch(SCHEMA).map_err(storage)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database. Useful for tests.
    pub fn open_in_memory() -> Result<Self, RegistryError> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        conn.execute_batch(SCHEMA).map_err(storage)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn load_all(conn: &Connection) -> Result<Vec<Device>, RegistryError> {
        let mut stmt = conn
            .prepare(
                "SELECT id, name, address, status, last_seen, firmware_version, \
                 location, metadata, created_at, updated_at FROM devices",
            )
            .map_err(storage)?;
        let rows = stmt
            .query_map([], row_to_device)
            .map_err(storage)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage)?;
        Ok(rows)
    }
}

fn storage(err: rusqlite::Error) -> RegistryError {
    RegistryError::Storage {
        reason: err.to_string(),
    }
}

fn parse_status(s: &str) -> DeviceStatus {
    match s {
        "online" => DeviceStatus::Online,
        "offline" => DeviceStatus::Offline,
        _ => DeviceStatus::Unknown,
    }
}

fn row_to_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<Device> {
    let status: String = row.get(3)?;
    let metadata: String = row.get(7)?;
    Ok(Device {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        status: parse_status(&status),
        last_seen: row.get::<_, Option<DateTime<Utc>>>(4)?,
        firmware_version: row.get(5)?,
        location: row.get(6)?,
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn metadata_json(device: &Device) -> String {
    serde_json::to_string(&device.metadata).unwrap_or_else(|_| "{}".to_string())
}

#[async_trait]
impl DeviceRegistry for SqliteRegistry {
    async fn list(&self, filter: &Filter) -> Result<Vec<Device>, RegistryError> {
        let conn = self.lock();
        let mut matched: Vec<Device> = Self::load_all(&conn)?
            .into_iter()
            .filter(|d| filter.matches(d))
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(filter.paginate(matched))
    }

    async fn get(&self, id: &str) -> Result<Device, RegistryError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, address, status, last_seen, firmware_version, \
                 location, metadata, created_at, updated_at FROM devices WHERE id = ?1",
            )
            .map_err(storage)?;
        let mut rows = stmt
            .query_map(params![id], row_to_device)
            .map_err(storage)?;
        match rows.next() {
            Some(device) => device.map_err(storage),
            None => Err(RegistryError::NotFound { id: id.to_string() }),
        }
    }

    async fn add(&self, device: Device) -> Result<(), RegistryError> {
        validate(&device)?;
        let conn = self.lock();
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM devices WHERE id = ?1)",
                params![device.id],
                |row| row.get(0),
            )
            .map_err(storage)?;
        if exists {
            return Err(RegistryError::AlreadyExists { id: device.id });
        }
        conn.execute(
            "INSERT INTO devices (id, name, address, status, last_seen, firmware_version, \
             location, metadata, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                device.id,
                device.name,
                device.address,
                device.status.as_str(),
                device.last_seen,
                device.firmware_version,
                device.location,
                metadata_json(&device),
                device.created_at,
                device.updated_at,
            ],
        )
        .map_err(storage)?;
        Ok(())
    }

    async fn update(&self, device: Device) -> Result<(), RegistryError> {
        validate(&device)?;
        let conn = self.lock();
        let changed = conn
            .execute(
                "UPDATE devices SET name = ?2, address = ?3, status = ?4, last_seen = ?5, \
                 firmware_version = ?6, location = ?7, metadata = ?8, created_at = ?9, \
                 updated_at = ?10 WHERE id = ?1",
                params![
                    device.id,
                    device.name,
                    device.address,
                    device.status.as_str(),
                    device.last_seen,
                    device.firmware_version,
                    device.location,
                    metadata_json(&device),
                    device.created_at,
                    device.updated_at,
                ],
            )
            .map_err(storage)?;
        if changed == 0 {
            return Err(RegistryError::NotFound { id: device.id });
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        let conn = self.lock();
        let changed = conn
            .execute("DELETE FROM devices WHERE id = ?1", params![id])
            .map_err(storage)?;
        if changed == 0 {
            return Err(RegistryError::NotFound { id: id.to_string() });
        }
        Ok(())
    }
}
