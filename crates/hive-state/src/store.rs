//! SQLite persistence backend
//!
//! One pooled connection to a single database file. Rows are record
//! shaped: stable key columns for lookup plus a JSON blob for everything
//! the schema does not need to index. Resource item values are persisted
//! per (owner, suffix) pair so a restart restores each item with the
//! timestamp it last changed at.

use std::collections::HashMap;
use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use crate::error::{Result, StateError};

/// One API key grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRecord {
    pub api_key: String,
    pub device_type: String,
    pub created_at: String,
    pub last_used: String,
}

/// Persisted device row. `data` carries the non-indexed fields
/// (capabilities, bindings, description policy) as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub key: String,
    pub nwk: u16,
    pub data: serde_json::Value,
}

/// Persisted sub-device row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubDeviceRecord {
    pub uniqueid: String,
    pub device_key: String,
    pub endpoint: u8,
    pub kind: String,
}

/// One persisted resource item value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub uniqueid: String,
    pub suffix: String,
    pub value: serde_json::Value,
    pub timestamp: String,
}

/// SQLite-backed store for all gateway state.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        info!("state store opened: {}", path.as_ref().display());
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS auth (
                api_key TEXT PRIMARY KEY,
                device_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_used TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS devices (
                key TEXT PRIMARY KEY,
                nwk INTEGER NOT NULL,
                data TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sub_devices (
                uniqueid TEXT PRIMARY KEY,
                device_key TEXT NOT NULL,
                endpoint INTEGER NOT NULL,
                kind TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS resource_items (
                uniqueid TEXT NOT NULL,
                suffix TEXT NOT NULL,
                value TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                PRIMARY KEY (uniqueid, suffix)
            );
            CREATE TABLE IF NOT EXISTS groups (
                id INTEGER PRIMARY KEY,
                data TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS scenes (
                group_id INTEGER NOT NULL,
                scene_id INTEGER NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (group_id, scene_id)
            );
            CREATE TABLE IF NOT EXISTS resourcelinks (
                id INTEGER PRIMARY KEY,
                data TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ===== Auth =====

    pub async fn save_auth(&self, record: &AuthRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO auth (api_key, device_type, created_at, last_used)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(api_key) DO UPDATE SET
                 device_type = excluded.device_type,
                 last_used = excluded.last_used",
        )
        .bind(&record.api_key)
        .bind(&record.device_type)
        .bind(&record.created_at)
        .bind(&record.last_used)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_auth(&self) -> Result<Vec<AuthRecord>> {
        let rows = sqlx::query("SELECT api_key, device_type, created_at, last_used FROM auth")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| AuthRecord {
                api_key: row.get("api_key"),
                device_type: row.get("device_type"),
                created_at: row.get("created_at"),
                last_used: row.get("last_used"),
            })
            .collect())
    }

    pub async fn delete_auth(&self, api_key: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM auth WHERE api_key = ?")
            .bind(api_key)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StateError::NotFound {
                entity: "auth".to_string(),
                id: api_key.to_string(),
            });
        }
        Ok(())
    }

    // ===== Config =====

    pub async fn save_config(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO config (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_config(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM config")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get("key"), row.get("value")))
            .collect())
    }

    // ===== Devices =====

    pub async fn save_device(&self, record: &DeviceRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO devices (key, nwk, data) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                 nwk = excluded.nwk,
                 data = excluded.data",
        )
        .bind(&record.key)
        .bind(i64::from(record.nwk))
        .bind(record.data.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_devices(&self) -> Result<Vec<DeviceRecord>> {
        let rows = sqlx::query("SELECT key, nwk, data FROM devices")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let data: String = row.get("data");
                let nwk: i64 = row.get("nwk");
                Ok(DeviceRecord {
                    key: row.get("key"),
                    nwk: nwk as u16,
                    data: serde_json::from_str(&data)
                        .map_err(|e| StateError::Deserialization(e.to_string()))?,
                })
            })
            .collect()
    }

    /// Delete a device with its sub-devices and their items.
    pub async fn delete_device(&self, key: &str) -> Result<()> {
        sqlx::query(
            "DELETE FROM resource_items WHERE uniqueid IN
                 (SELECT uniqueid FROM sub_devices WHERE device_key = ?)",
        )
        .bind(key)
        .execute(&self.pool)
        .await?;
        sqlx::query("DELETE FROM sub_devices WHERE device_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        let result = sqlx::query("DELETE FROM devices WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StateError::NotFound {
                entity: "device".to_string(),
                id: key.to_string(),
            });
        }
        debug!("deleted device {} and dependents", key);
        Ok(())
    }

    // ===== Sub-devices =====

    pub async fn save_sub_device(&self, record: &SubDeviceRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO sub_devices (uniqueid, device_key, endpoint, kind)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(uniqueid) DO UPDATE SET
                 device_key = excluded.device_key,
                 endpoint = excluded.endpoint,
                 kind = excluded.kind",
        )
        .bind(&record.uniqueid)
        .bind(&record.device_key)
        .bind(i64::from(record.endpoint))
        .bind(&record.kind)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_sub_devices(&self) -> Result<Vec<SubDeviceRecord>> {
        let rows = sqlx::query("SELECT uniqueid, device_key, endpoint, kind FROM sub_devices")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let endpoint: i64 = row.get("endpoint");
                SubDeviceRecord {
                    uniqueid: row.get("uniqueid"),
                    device_key: row.get("device_key"),
                    endpoint: endpoint as u8,
                    kind: row.get("kind"),
                }
            })
            .collect())
    }

    // ===== Resource items =====

    pub async fn save_item(&self, record: &ItemRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO resource_items (uniqueid, suffix, value, timestamp)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(uniqueid, suffix) DO UPDATE SET
                 value = excluded.value,
                 timestamp = excluded.timestamp",
        )
        .bind(&record.uniqueid)
        .bind(&record.suffix)
        .bind(record.value.to_string())
        .bind(&record.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_items(&self, uniqueid: &str) -> Result<Vec<ItemRecord>> {
        let rows = sqlx::query(
            "SELECT uniqueid, suffix, value, timestamp FROM resource_items WHERE uniqueid = ?",
        )
        .bind(uniqueid)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(item_from_row).collect()
    }

    pub async fn load_all_items(&self) -> Result<Vec<ItemRecord>> {
        let rows = sqlx::query("SELECT uniqueid, suffix, value, timestamp FROM resource_items")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(item_from_row).collect()
    }

    // ===== Groups =====

    pub async fn save_group(&self, id: u16, data: &serde_json::Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO groups (id, data) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
        )
        .bind(i64::from(id))
        .bind(data.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_groups(&self) -> Result<Vec<(u16, serde_json::Value)>> {
        let rows = sqlx::query("SELECT id, data FROM groups")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let id: i64 = row.get("id");
                let data: String = row.get("data");
                Ok((
                    id as u16,
                    serde_json::from_str(&data)
                        .map_err(|e| StateError::Deserialization(e.to_string()))?,
                ))
            })
            .collect()
    }

    /// Delete a group and its scenes.
    pub async fn delete_group(&self, id: u16) -> Result<()> {
        sqlx::query("DELETE FROM scenes WHERE group_id = ?")
            .bind(i64::from(id))
            .execute(&self.pool)
            .await?;
        let result = sqlx::query("DELETE FROM groups WHERE id = ?")
            .bind(i64::from(id))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StateError::NotFound {
                entity: "group".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ===== Scenes =====

    pub async fn save_scene(&self, group_id: u16, scene_id: u8, data: &serde_json::Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO scenes (group_id, scene_id, data) VALUES (?, ?, ?)
             ON CONFLICT(group_id, scene_id) DO UPDATE SET data = excluded.data",
        )
        .bind(i64::from(group_id))
        .bind(i64::from(scene_id))
        .bind(data.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_scenes(&self, group_id: u16) -> Result<Vec<(u8, serde_json::Value)>> {
        let rows = sqlx::query("SELECT scene_id, data FROM scenes WHERE group_id = ?")
            .bind(i64::from(group_id))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let scene_id: i64 = row.get("scene_id");
                let data: String = row.get("data");
                Ok((
                    scene_id as u8,
                    serde_json::from_str(&data)
                        .map_err(|e| StateError::Deserialization(e.to_string()))?,
                ))
            })
            .collect()
    }

    pub async fn delete_scene(&self, group_id: u16, scene_id: u8) -> Result<()> {
        let result = sqlx::query("DELETE FROM scenes WHERE group_id = ? AND scene_id = ?")
            .bind(i64::from(group_id))
            .bind(i64::from(scene_id))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StateError::NotFound {
                entity: "scene".to_string(),
                id: format!("{}/{}", group_id, scene_id),
            });
        }
        Ok(())
    }

    // ===== Resource links =====

    pub async fn save_resource_link(&self, id: u16, data: &serde_json::Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO resourcelinks (id, data) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
        )
        .bind(i64::from(id))
        .bind(data.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_resource_links(&self) -> Result<Vec<(u16, serde_json::Value)>> {
        let rows = sqlx::query("SELECT id, data FROM resourcelinks")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let id: i64 = row.get("id");
                let data: String = row.get("data");
                Ok((
                    id as u16,
                    serde_json::from_str(&data)
                        .map_err(|e| StateError::Deserialization(e.to_string()))?,
                ))
            })
            .collect()
    }

    pub async fn delete_resource_link(&self, id: u16) -> Result<()> {
        let result = sqlx::query("DELETE FROM resourcelinks WHERE id = ?")
            .bind(i64::from(id))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StateError::NotFound {
                entity: "resourcelink".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

fn item_from_row(row: sqlx::sqlite::SqliteRow) -> Result<ItemRecord> {
    let value: String = row.get("value");
    Ok(ItemRecord {
        uniqueid: row.get("uniqueid"),
        suffix: row.get("suffix"),
        value: serde_json::from_str(&value)
            .map_err(|e| StateError::Deserialization(e.to_string()))?,
        timestamp: row.get("timestamp"),
    })
}
