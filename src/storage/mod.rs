//! SQLite persistence for the camera directory, detection events and alert records.
//!
//! All three stores can share one database file; each keeps its own connection behind a
//! mutex so sessions on different threads can write concurrently (WAL + busy timeout).
//! Every store has an in-memory twin with the same semantics for tests.

use std::time::Duration;

use anyhow::Result;
use rusqlite::{Connection, OpenFlags};

pub mod alerts;
pub mod cameras;
pub mod detections;

pub use alerts::{AlertRecordStore, InMemoryAlertRecordStore, SqliteAlertRecordStore};
pub use cameras::{
    CameraDirectory, CameraFeed, CameraRecord, InMemoryCameraDirectory, NewCamera,
    SqliteCameraDirectory,
};
pub use detections::{
    DetectionEvent, DetectionStore, InMemoryDetectionStore, SqliteDetectionStore,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a connection to `db_path`; `file:` URIs are honoured (shared in-memory databases).
pub fn open_db_connection(db_path: &str) -> Result<Connection> {
    let conn = if db_path.starts_with("file:") {
        Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?
    } else {
        Connection::open(db_path)?
    };
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    ensure_schema(&conn)?;
    Ok(conn)
}

fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;

        CREATE TABLE IF NOT EXISTS regions (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS sub_regions (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          region_id INTEGER NOT NULL REFERENCES regions(id),
          name TEXT NOT NULL,
          UNIQUE(region_id, name)
        );

        CREATE TABLE IF NOT EXISTS cameras (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL,
          stream_address TEXT NOT NULL,
          region_id INTEGER NOT NULL REFERENCES regions(id),
          sub_region_id INTEGER NOT NULL REFERENCES sub_regions(id),
          status TEXT NOT NULL DEFAULT 'active'
        );

        CREATE TABLE IF NOT EXISTS detections (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          camera_id INTEGER NOT NULL REFERENCES cameras(id),
          alert_type TEXT NOT NULL,
          confidence REAL NOT NULL,
          time_of_day TEXT NOT NULL,
          date TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS alert_records (
          alert_key TEXT PRIMARY KEY,
          camera_id INTEGER NOT NULL,
          region_id INTEGER NOT NULL,
          sub_region_id INTEGER NOT NULL,
          alert_type TEXT NOT NULL,
          first_alert_time TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_detections_camera ON detections(camera_id);
        "#,
    )?;
    Ok(())
}
