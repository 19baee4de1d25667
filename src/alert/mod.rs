//! First-occurrence alerting per location.
//!
//! A location is the `(camera, region, sub-region)` triple. The first recorded detection at a
//! location claims its `AlertRecord` and dispatches one notification; every later detection
//! there is a no-op. Claims are atomic in the store, so concurrent sessions on the same camera
//! dispatch at most once. Records are permanent and the hazard type is not part of the key.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Local};
use serde::Serialize;

pub mod dispatch;

pub use dispatch::{
    AlertDispatcher, LogDispatcher, MqttDispatcher, Notification, WebhookDispatcher,
};

use crate::error::PipelineError;
use crate::storage::{AlertRecordStore, CameraRecord};

pub const DEFAULT_SUBJECT: &str = "Fire Alert - Immediate Action Required";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct AlertKey {
    pub camera_id: i64,
    pub region_id: i64,
    pub sub_region_id: i64,
}

impl AlertKey {
    pub fn new(camera_id: i64, region_id: i64, sub_region_id: i64) -> Self {
        Self {
            camera_id,
            region_id,
            sub_region_id,
        }
    }

    pub fn for_camera(camera: &CameraRecord) -> Self {
        Self::new(camera.id, camera.region_id, camera.sub_region_id)
    }
}

/// Persisted as `{camera}_{region}_{sub_region}`.
impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.camera_id, self.region_id, self.sub_region_id
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlertRecord {
    pub key: AlertKey,
    /// Hazard that triggered the first alert (informational only).
    pub alert_type: String,
    pub first_alert_time: DateTime<Local>,
}

impl AlertRecord {
    pub fn new(key: AlertKey, alert_type: impl Into<String>) -> Self {
        Self {
            key,
            alert_type: alert_type.into(),
            first_alert_time: Local::now(),
        }
    }
}

/// Outcome of offering one detection to the deduper.
#[derive(Clone, Debug, PartialEq)]
pub enum AlertDecision {
    /// The key was already alerted; nothing was dispatched or written.
    AlreadyAlerted,
    /// First occurrence: record written and notification sent.
    Dispatched(AlertRecord),
    /// First occurrence: record written, notification failed and will not be retried.
    DispatchFailed(AlertRecord, PipelineError),
}

#[derive(Clone, Debug)]
pub struct NotificationTemplate {
    pub recipients: Vec<String>,
    pub subject: String,
}

impl Default for NotificationTemplate {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            subject: DEFAULT_SUBJECT.to_string(),
        }
    }
}

impl NotificationTemplate {
    pub fn render(&self, camera: &CameraRecord, record: &AlertRecord) -> Notification {
        let when = record.first_alert_time.format("%Y-%m-%d %H:%M:%S");
        let body = format!(
            "Dear Resident,\n\n\
             A potential {hazard} has been detected at your location.\n\n\
             Camera: {camera} (id {camera_id})\n\
             Region: {region}, sub-region: {sub_region}\n\
             Detected at: {when}\n\n\
             Please evacuate the premises immediately and follow all emergency protocols.\n\n\
             If this alert was triggered in error, please report the incident to the \
             fire monitoring team for investigation.\n\n\
             Stay safe,\n\
             Fire Monitoring System\n",
            hazard = record.alert_type,
            camera = camera.name,
            camera_id = camera.id,
            region = record.key.region_id,
            sub_region = record.key.sub_region_id,
            when = when,
        );
        Notification {
            recipients: self.recipients.clone(),
            subject: self.subject.clone(),
            body,
            key: record.key,
            camera_name: camera.name.clone(),
            alert_type: record.alert_type.clone(),
            detected_at: record.first_alert_time,
        }
    }
}

/// Shared by every session; all state lives in the record store.
pub struct AlertDeduper {
    store: Arc<dyn AlertRecordStore>,
    dispatcher: Arc<dyn AlertDispatcher>,
    template: NotificationTemplate,
}

impl AlertDeduper {
    pub fn new(
        store: Arc<dyn AlertRecordStore>,
        dispatcher: Arc<dyn AlertDispatcher>,
        template: NotificationTemplate,
    ) -> Self {
        Self {
            store,
            dispatcher,
            template,
        }
    }

    /// Offer one recorded detection of `alert_type` on `camera`.
    ///
    /// The record is claimed before dispatch, so a dispatch failure still leaves the key
    /// alerted. Only a failing claim is an error; the caller logs it and carries on.
    pub fn observe(&self, camera: &CameraRecord, alert_type: &str) -> Result<AlertDecision> {
        let key = AlertKey::for_camera(camera);
        let record = AlertRecord::new(key, alert_type);
        if !self.store.claim(&record)? {
            log::debug!("alert key {} already alerted", key);
            return Ok(AlertDecision::AlreadyAlerted);
        }

        let notification = self.template.render(camera, &record);
        match self.dispatcher.dispatch(&notification) {
            Ok(()) => {
                log::info!(
                    "alert dispatched key={} type={} via={}",
                    key,
                    alert_type,
                    self.dispatcher.name()
                );
                Ok(AlertDecision::Dispatched(record))
            }
            Err(e) => {
                let err = PipelineError::DispatchFailed(format!("{:#}", e));
                log::error!("alert key={} marked alerted but {}", key, err);
                Ok(AlertDecision::DispatchFailed(record, err))
            }
        }
    }

    pub fn store(&self) -> &Arc<dyn AlertRecordStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryAlertRecordStore;
    use anyhow::anyhow;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    impl AlertDispatcher for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn dispatch(&self, notification: &Notification) -> Result<()> {
            self.sent
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .push(notification.clone());
            if self.fail {
                return Err(anyhow!("smtp unreachable"));
            }
            Ok(())
        }
    }

    fn camera(id: i64, region_id: i64, sub_region_id: i64) -> CameraRecord {
        CameraRecord {
            id,
            name: format!("cam-{}", id),
            stream_address: "stub://cam".into(),
            region_id,
            sub_region_id,
            active: true,
        }
    }

    fn deduper(dispatcher: Arc<Recording>) -> AlertDeduper {
        AlertDeduper::new(
            Arc::new(InMemoryAlertRecordStore::new()),
            dispatcher,
            NotificationTemplate {
                recipients: vec!["ops@example.org".into()],
                ..NotificationTemplate::default()
            },
        )
    }

    #[test]
    fn key_format() {
        assert_eq!(AlertKey::new(7, 2, 5).to_string(), "7_2_5");
    }

    #[test]
    fn repeated_detection_dispatches_once() -> Result<()> {
        let dispatcher = Arc::new(Recording::default());
        let deduper = deduper(dispatcher.clone());
        let cam = camera(7, 2, 5);

        assert!(matches!(
            deduper.observe(&cam, "fire")?,
            AlertDecision::Dispatched(_)
        ));
        assert_eq!(
            deduper.observe(&cam, "fire")?,
            AlertDecision::AlreadyAlerted
        );
        // A different hazard at the same location is still deduplicated.
        assert_eq!(
            deduper.observe(&cam, "smoke")?,
            AlertDecision::AlreadyAlerted
        );

        let sent = dispatcher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, DEFAULT_SUBJECT);
        assert_eq!(sent[0].recipients, vec!["ops@example.org".to_string()]);
        assert!(sent[0].body.contains("potential fire"));
        assert!(sent[0].body.contains("cam-7"));
        assert_eq!(deduper.store().len()?, 1);
        Ok(())
    }

    #[test]
    fn failed_dispatch_still_marks_alerted() -> Result<()> {
        let dispatcher = Arc::new(Recording {
            fail: true,
            ..Recording::default()
        });
        let deduper = deduper(dispatcher.clone());
        let cam = camera(3, 1, 1);

        match deduper.observe(&cam, "fire")? {
            AlertDecision::DispatchFailed(record, PipelineError::DispatchFailed(reason)) => {
                assert_eq!(record.key, AlertKey::new(3, 1, 1));
                assert!(reason.contains("smtp unreachable"));
            }
            other => panic!("unexpected decision {other:?}"),
        }
        assert_eq!(
            deduper.observe(&cam, "fire")?,
            AlertDecision::AlreadyAlerted
        );
        assert_eq!(dispatcher.sent.lock().unwrap().len(), 1);
        assert!(deduper.store().get(&AlertKey::new(3, 1, 1))?.is_some());
        Ok(())
    }

    #[test]
    fn concurrent_observers_dispatch_once() -> Result<()> {
        let dispatcher = Arc::new(Recording::default());
        let deduper = Arc::new(deduper(dispatcher.clone()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let deduper = deduper.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .map(|_| deduper.observe(&camera(7, 2, 5), "fire"))
                        .collect::<Result<Vec<_>>>()
                })
            })
            .collect();
        let mut dispatched = 0;
        for handle in handles {
            let decisions = handle.join().map_err(|_| anyhow!("observer panicked"))??;
            dispatched += decisions
                .iter()
                .filter(|d| matches!(d, AlertDecision::Dispatched(_)))
                .count();
        }
        assert_eq!(dispatched, 1);
        assert_eq!(dispatcher.sent.lock().unwrap().len(), 1);
        Ok(())
    }
}
