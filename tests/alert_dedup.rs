mod common;

use std::sync::{Arc, Barrier};

use common::{camera, RecordingDispatcher};
use hazard_watch::alert::{AlertDecision, AlertDeduper, AlertDispatcher, NotificationTemplate};
use hazard_watch::detect::{BoundingBox, Detection};
use hazard_watch::pipeline::{DetectionRecorder, RecordSummary};
use hazard_watch::storage::{
    AlertRecordStore, CameraDirectory, DetectionStore, NewCamera, SqliteAlertRecordStore,
    SqliteCameraDirectory, SqliteDetectionStore,
};
use hazard_watch::AlertKey;

fn temp_db() -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("hazard.db").to_string_lossy().into_owned();
    (dir, path)
}

#[test]
fn racing_sessions_on_separate_connections_dispatch_once() {
    let (_dir, db_path) = temp_db();
    // Create the schema before the race.
    SqliteAlertRecordStore::open(&db_path).expect("open store");

    let dispatcher = Arc::new(RecordingDispatcher::default());
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let db_path = db_path.clone();
            let dispatcher = dispatcher.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                let store = Arc::new(SqliteAlertRecordStore::open(&db_path).expect("open store"));
                let deduper = AlertDeduper::new(
                    store,
                    dispatcher as Arc<dyn AlertDispatcher>,
                    NotificationTemplate::default(),
                );
                barrier.wait();
                deduper.observe(&camera(7, 2, 5), "fire").expect("observe")
            })
        })
        .collect();

    let decisions: Vec<AlertDecision> = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .collect();
    let dispatched = decisions
        .iter()
        .filter(|d| matches!(d, AlertDecision::Dispatched(_)))
        .count();
    assert_eq!(dispatched, 1);
    assert_eq!(dispatcher.count(), 1);

    let store = SqliteAlertRecordStore::open(&db_path).expect("reopen");
    assert_eq!(store.len().unwrap(), 1);
    assert!(store.get(&AlertKey::new(7, 2, 5)).unwrap().is_some());
}

#[test]
fn alert_records_survive_a_restart() {
    let (_dir, db_path) = temp_db();
    let dispatcher = Arc::new(RecordingDispatcher::default());

    {
        let deduper = AlertDeduper::new(
            Arc::new(SqliteAlertRecordStore::open(&db_path).unwrap()),
            dispatcher.clone() as Arc<dyn AlertDispatcher>,
            NotificationTemplate::default(),
        );
        assert!(matches!(
            deduper.observe(&camera(1, 1, 1), "smoke").unwrap(),
            AlertDecision::Dispatched(_)
        ));
    }

    let deduper = AlertDeduper::new(
        Arc::new(SqliteAlertRecordStore::open(&db_path).unwrap()),
        dispatcher.clone() as Arc<dyn AlertDispatcher>,
        NotificationTemplate::default(),
    );
    // Same location, different hazard: still suppressed.
    assert!(matches!(
        deduper.observe(&camera(1, 1, 1), "fire").unwrap(),
        AlertDecision::AlreadyAlerted
    ));
    // Another sub-region of the same camera id is a different key.
    assert!(matches!(
        deduper.observe(&camera(1, 1, 2), "fire").unwrap(),
        AlertDecision::Dispatched(_)
    ));
    assert_eq!(dispatcher.count(), 2);
}

#[test]
fn recorder_writes_detection_rows_for_registered_cameras() {
    let (_dir, db_path) = temp_db();
    let directory = SqliteCameraDirectory::open(&db_path).unwrap();
    let camera_id = directory
        .register(&NewCamera {
            name: "Loading Bay".to_string(),
            stream_address: "stub://bay".to_string(),
            region: "North".to_string(),
            sub_region: "Dock".to_string(),
            status: "active".to_string(),
        })
        .unwrap();
    let record = directory
        .camera_by_id(camera_id)
        .unwrap()
        .expect("registered camera");

    let dispatcher = Arc::new(RecordingDispatcher::default());
    let detections = Arc::new(SqliteDetectionStore::open(&db_path).unwrap());
    let deduper = Arc::new(AlertDeduper::new(
        Arc::new(SqliteAlertRecordStore::open(&db_path).unwrap()),
        dispatcher.clone() as Arc<dyn AlertDispatcher>,
        NotificationTemplate::default(),
    ));
    let recorder = DetectionRecorder::new(detections.clone(), deduper);

    let batch = vec![
        Detection::new("fire", 0.8, BoundingBox::new(0.1, 0.1, 0.2, 0.2)),
        Detection::new("smoke", 0.4, BoundingBox::new(0.5, 0.5, 0.2, 0.2)),
    ];
    let mut summary = RecordSummary::default();
    recorder.record_all(&record, &batch, &mut summary);
    recorder.record_all(&record, &batch[..1], &mut summary);

    assert_eq!(summary.recorded, 3);
    assert_eq!(summary.persistence_failures, 0);
    assert_eq!(summary.alerts_dispatched, 1);
    assert_eq!(dispatcher.count(), 1);

    let events = detections.events_for_camera(camera_id).unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.alert_type.as_str()).collect();
    assert_eq!(types, vec!["fire", "smoke", "fire"]);
    assert_eq!(events[0].date.len(), 10);
    assert_eq!(events[0].time_of_day.len(), 8);

    // Unknown camera ids are rejected by the foreign key and counted.
    let mut ghost = record.clone();
    ghost.id = camera_id + 100;
    let mut ghost_summary = RecordSummary::default();
    recorder.record_all(&ghost, &batch[..1], &mut ghost_summary);
    assert_eq!(ghost_summary.recorded, 0);
    assert_eq!(ghost_summary.persistence_failures, 1);
}

#[test]
fn camera_directory_lists_only_active_cameras() {
    let (_dir, db_path) = temp_db();
    let directory = SqliteCameraDirectory::open(&db_path).unwrap();
    let active = directory
        .register(&NewCamera {
            name: "Gate".to_string(),
            stream_address: "rtsp://10.0.0.9/live".to_string(),
            region: "East".to_string(),
            sub_region: "Gate".to_string(),
            status: "active".to_string(),
        })
        .unwrap();
    let retired = directory
        .register(&NewCamera {
            name: "Old Gate".to_string(),
            stream_address: "rtsp://10.0.0.10/live".to_string(),
            region: "East".to_string(),
            sub_region: "Gate".to_string(),
            status: "inactive".to_string(),
        })
        .unwrap();

    let feeds = directory.camera_feeds().unwrap();
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds[0].id, active);
    assert_eq!(feeds[0].region_name, "East");
    assert_eq!(directory.camera_count().unwrap(), 2);

    let gate = directory.camera_by_id(active).unwrap().unwrap();
    let old = directory.camera_by_id(retired);
    assert!(matches!(old, Ok(None)));
    assert_eq!(gate.sub_region_id, 1);
}
