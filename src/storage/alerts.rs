use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension};

use super::open_db_connection;
use crate::alert::{AlertKey, AlertRecord};

/// Durable set of alerted keys.
///
/// `claim` is the only write: it inserts the record if the key is unseen and reports whether
/// this caller inserted it. Records are never updated or removed.
pub trait AlertRecordStore: Send + Sync {
    fn claim(&self, record: &AlertRecord) -> Result<bool>;

    fn get(&self, key: &AlertKey) -> Result<Option<AlertRecord>>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

pub struct SqliteAlertRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteAlertRecordStore {
    pub fn open(db_path: &str) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(open_db_connection(db_path)?),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("alert record store lock poisoned"))
    }
}

impl AlertRecordStore for SqliteAlertRecordStore {
    fn claim(&self, record: &AlertRecord) -> Result<bool> {
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                r#"
                INSERT OR IGNORE INTO alert_records(
                  alert_key, camera_id, region_id, sub_region_id, alert_type, first_alert_time
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    record.key.to_string(),
                    record.key.camera_id,
                    record.key.region_id,
                    record.key.sub_region_id,
                    record.alert_type,
                    record.first_alert_time.to_rfc3339()
                ],
            )
            .with_context(|| format!("claim alert key {}", record.key))?;
        Ok(inserted == 1)
    }

    fn get(&self, key: &AlertKey) -> Result<Option<AlertRecord>> {
        let conn = self.lock()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT alert_type, first_alert_time FROM alert_records WHERE alert_key = ?1",
                params![key.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((alert_type, first_alert_time)) = row else {
            return Ok(None);
        };
        let first_alert_time = DateTime::parse_from_rfc3339(&first_alert_time)
            .with_context(|| format!("corrupt first_alert_time for {}", key))?
            .with_timezone(&Local);
        Ok(Some(AlertRecord {
            key: *key,
            alert_type,
            first_alert_time,
        }))
    }

    fn len(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM alert_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAlertRecordStore {
    records: Mutex<HashMap<AlertKey, AlertRecord>>,
}

impl InMemoryAlertRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertRecordStore for InMemoryAlertRecordStore {
    fn claim(&self, record: &AlertRecord) -> Result<bool> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow!("alert record store lock poisoned"))?;
        if records.contains_key(&record.key) {
            return Ok(false);
        }
        records.insert(record.key, record.clone());
        Ok(true)
    }

    fn get(&self, key: &AlertKey) -> Result<Option<AlertRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow!("alert record store lock poisoned"))?;
        Ok(records.get(key).cloned())
    }

    fn len(&self) -> Result<usize> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow!("alert record store lock poisoned"))?;
        Ok(records.len())
    }
}
