// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Device record storage using SQLite.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A lock that went through (part of) provisioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: i64,
    pub lock_mac: Option<String>,
    pub imei: Option<String>,
    pub provisioning_status: Option<String>,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
}

/// Persistence for device records. Records are never deleted.
pub trait DeviceStore: Send + Sync {
    /// Insert an empty record and return it.
    fn create(&self) -> Result<DeviceRecord>;

    /// Persist the record's fields.
    fn update(&self, record: &DeviceRecord) -> Result<()>;

    fn get(&self, id: i64) -> Result<Option<DeviceRecord>>;

    /// All records, oldest first.
    fn list(&self) -> Result<Vec<DeviceRecord>>;
}

/// Device database manager.
#[derive(Clone)]
pub struct SqliteDeviceStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDeviceStore {
    /// Create or open the device database.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("devices.db");
        info!("Opening device database: {:?}", db_path);

        Self::from_connection(Connection::open(&db_path)?)
    }

    /// Throwaway database.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS device (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lock_mac TEXT,
                imei TEXT,
                provisioning TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_device_mac ON device(lock_mac)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<DeviceRecord> {
        let created: i64 = row.get(4)?;
        let updated: i64 = row.get(5)?;
        Ok(DeviceRecord {
            id: row.get(0)?,
            lock_mac: row.get(1)?,
            imei: row.get(2)?,
            provisioning_status: row.get(3)?,
            created_at: local_time(created),
            updated_at: local_time(updated),
        })
    }
}

fn local_time(secs: i64) -> DateTime<Local> {
    Local
        .timestamp_opt(secs, 0)
        .single()
        .unwrap_or_else(Local::now)
}

impl DeviceStore for SqliteDeviceStore {
    fn create(&self) -> Result<DeviceRecord> {
        let conn = self.conn.lock();
        let now = Local::now().timestamp();

        conn.execute(
            "INSERT INTO device (created_at, updated_at) VALUES (?1, ?1)",
            params![now],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Created device record #{}", id);

        Ok(DeviceRecord {
            id,
            lock_mac: None,
            imei: None,
            provisioning_status: None,
            created_at: local_time(now),
            updated_at: local_time(now),
        })
    }

    fn update(&self, record: &DeviceRecord) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE device SET lock_mac = ?1, imei = ?2, provisioning = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                record.lock_mac,
                record.imei,
                record.provisioning_status,
                Local::now().timestamp(),
                record.id
            ],
        )?;
        if changed == 0 {
            return Err(anyhow!("device record #{} does not exist", record.id));
        }
        Ok(())
    }

    fn get(&self, id: i64) -> Result<Option<DeviceRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT id, lock_mac, imei, provisioning, created_at, updated_at
                 FROM device WHERE id = ?1",
                [id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn list(&self) -> Result<Vec<DeviceRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, lock_mac, imei, provisioning, created_at, updated_at
             FROM device
             ORDER BY id ASC",
        )?;

        let records = stmt
            .query_map([], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}
