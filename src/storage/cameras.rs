use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::open_db_connection;

/// What a stream session needs to know about a camera.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CameraRecord {
    pub id: i64,
    pub name: String,
    pub stream_address: String,
    pub region_id: i64,
    pub sub_region_id: i64,
    pub active: bool,
}

/// Row of the camera listing shown to viewers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CameraFeed {
    pub id: i64,
    pub name: String,
    pub stream_address: String,
    pub region_name: String,
    pub sub_region_name: String,
    pub status: String,
}

/// Camera registration input (seeding).
#[derive(Clone, Debug, Deserialize)]
pub struct NewCamera {
    pub name: String,
    pub stream_address: String,
    pub region: String,
    pub sub_region: String,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "active".to_string()
}

/// Read side of the camera registry. Only active cameras are visible.
pub trait CameraDirectory: Send + Sync {
    fn camera_feeds(&self) -> Result<Vec<CameraFeed>>;

    fn camera_by_id(&self, id: i64) -> Result<Option<CameraRecord>>;
}

pub struct SqliteCameraDirectory {
    conn: Mutex<Connection>,
}

impl SqliteCameraDirectory {
    pub fn open(db_path: &str) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(open_db_connection(db_path)?),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("camera directory lock poisoned"))
    }

    pub fn camera_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM cameras", [], |row| row.get(0))?)
    }

    /// Insert a camera, creating its region and sub-region on first use.
    pub fn register(&self, camera: &NewCamera) -> Result<i64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO regions(name) VALUES (?1)",
            params![camera.region],
        )?;
        let region_id: i64 = tx.query_row(
            "SELECT id FROM regions WHERE name = ?1",
            params![camera.region],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO sub_regions(region_id, name) VALUES (?1, ?2)",
            params![region_id, camera.sub_region],
        )?;
        let sub_region_id: i64 = tx.query_row(
            "SELECT id FROM sub_regions WHERE region_id = ?1 AND name = ?2",
            params![region_id, camera.sub_region],
            |row| row.get(0),
        )?;
        tx.execute(
            r#"
            INSERT INTO cameras(name, stream_address, region_id, sub_region_id, status)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                camera.name,
                camera.stream_address,
                region_id,
                sub_region_id,
                camera.status
            ],
        )
        .with_context(|| format!("insert camera {}", camera.name))?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }
}

impl CameraDirectory for SqliteCameraDirectory {
    fn camera_feeds(&self) -> Result<Vec<CameraFeed>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.name, c.stream_address, r.name, s.name, c.status
            FROM cameras c
            JOIN regions r ON r.id = c.region_id
            JOIN sub_regions s ON s.id = c.sub_region_id
            WHERE c.status = 'active' COLLATE NOCASE
            ORDER BY c.id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CameraFeed {
                id: row.get(0)?,
                name: row.get(1)?,
                stream_address: row.get(2)?,
                region_name: row.get(3)?,
                sub_region_name: row.get(4)?,
                status: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn camera_by_id(&self, id: i64) -> Result<Option<CameraRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                r#"
                SELECT id, name, stream_address, region_id, sub_region_id
                FROM cameras WHERE id = ?1 AND status = 'active' COLLATE NOCASE
                "#,
                params![id],
                |row| {
                    Ok(CameraRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        stream_address: row.get(2)?,
                        region_id: row.get(3)?,
                        sub_region_id: row.get(4)?,
                        active: true,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCameraDirectory {
    cameras: Vec<(CameraRecord, String, String)>,
}

impl InMemoryCameraDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_camera(
        mut self,
        camera: CameraRecord,
        region_name: &str,
        sub_region_name: &str,
    ) -> Self {
        self.cameras
            .push((camera, region_name.to_string(), sub_region_name.to_string()));
        self
    }
}

impl CameraDirectory for InMemoryCameraDirectory {
    fn camera_feeds(&self) -> Result<Vec<CameraFeed>> {
        Ok(self
            .cameras
            .iter()
            .filter(|(camera, _, _)| camera.active)
            .map(|(camera, region, sub_region)| CameraFeed {
                id: camera.id,
                name: camera.name.clone(),
                stream_address: camera.stream_address.clone(),
                region_name: region.clone(),
                sub_region_name: sub_region.clone(),
                status: "active".to_string(),
            })
            .collect())
    }

    fn camera_by_id(&self, id: i64) -> Result<Option<CameraRecord>> {
        Ok(self
            .cameras
            .iter()
            .map(|(camera, _, _)| camera)
            .find(|camera| camera.id == id && camera.active)
            .cloned())
    }
}
