use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection};
use serde::Serialize;

use super::open_db_connection;
use crate::detect::Detection;

/// One persisted accepted detection. Rows are append-only.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionEvent {
    pub id: i64,
    pub camera_id: i64,
    pub alert_type: String,
    pub confidence: f32,
    /// `HH:MM:SS`, local time of the source frame.
    pub time_of_day: String,
    /// `YYYY-MM-DD`, local date of the source frame.
    pub date: String,
}

fn time_fields(detection: &Detection) -> (String, String) {
    (
        detection.frame_timestamp.format("%H:%M:%S").to_string(),
        detection.frame_timestamp.format("%Y-%m-%d").to_string(),
    )
}

pub trait DetectionStore: Send + Sync {
    fn append(&self, camera_id: i64, detection: &Detection) -> Result<DetectionEvent>;

    fn events_for_camera(&self, camera_id: i64) -> Result<Vec<DetectionEvent>>;
}

pub struct SqliteDetectionStore {
    conn: Mutex<Connection>,
}

impl SqliteDetectionStore {
    pub fn open(db_path: &str) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(open_db_connection(db_path)?),
        })
    }
}

impl DetectionStore for SqliteDetectionStore {
    fn append(&self, camera_id: i64, detection: &Detection) -> Result<DetectionEvent> {
        let (time_of_day, date) = time_fields(detection);
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("detection store lock poisoned"))?;
        conn.execute(
            r#"
            INSERT INTO detections(camera_id, alert_type, confidence, time_of_day, date)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                camera_id,
                detection.label,
                detection.confidence as f64,
                time_of_day,
                date
            ],
        )
        .with_context(|| format!("insert detection for camera {}", camera_id))?;
        Ok(DetectionEvent {
            id: conn.last_insert_rowid(),
            camera_id,
            alert_type: detection.label.clone(),
            confidence: detection.confidence,
            time_of_day,
            date,
        })
    }

    fn events_for_camera(&self, camera_id: i64) -> Result<Vec<DetectionEvent>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("detection store lock poisoned"))?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, camera_id, alert_type, confidence, time_of_day, date
            FROM detections WHERE camera_id = ?1 ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![camera_id], |row| {
            Ok(DetectionEvent {
                id: row.get(0)?,
                camera_id: row.get(1)?,
                alert_type: row.get(2)?,
                confidence: row.get::<_, f64>(3)? as f32,
                time_of_day: row.get(4)?,
                date: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDetectionStore {
    events: Mutex<Vec<DetectionEvent>>,
}

impl InMemoryDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DetectionStore for InMemoryDetectionStore {
    fn append(&self, camera_id: i64, detection: &Detection) -> Result<DetectionEvent> {
        let (time_of_day, date) = time_fields(detection);
        let mut events = self
            .events
            .lock()
            .map_err(|_| anyhow!("detection store lock poisoned"))?;
        let event = DetectionEvent {
            id: events.len() as i64 + 1,
            camera_id,
            alert_type: detection.label.clone(),
            confidence: detection.confidence,
            time_of_day,
            date,
        };
        events.push(event.clone());
        Ok(event)
    }

    fn events_for_camera(&self, camera_id: i64) -> Result<Vec<DetectionEvent>> {
        let events = self
            .events
            .lock()
            .map_err(|_| anyhow!("detection store lock poisoned"))?;
        Ok(events
            .iter()
            .filter(|e| e.camera_id == camera_id)
            .cloned()
            .collect())
    }
}
