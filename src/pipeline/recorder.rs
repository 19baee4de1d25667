use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::alert::{AlertDecision, AlertDeduper};
use crate::detect::Detection;
use crate::error::PipelineError;
use crate::storage::{CameraRecord, DetectionEvent, DetectionStore};

/// Counters from one session's record/alert work.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub recorded: u64,
    pub persistence_failures: u64,
    pub alerts_dispatched: u64,
    pub dispatch_failures: u64,
}

/// Persists every accepted detection and offers it to the alert deduper.
pub struct DetectionRecorder {
    store: Arc<dyn DetectionStore>,
    deduper: Arc<AlertDeduper>,
}

impl DetectionRecorder {
    pub fn new(store: Arc<dyn DetectionStore>, deduper: Arc<AlertDeduper>) -> Self {
        Self { store, deduper }
    }

    pub fn record(
        &self,
        camera_id: i64,
        detection: &Detection,
    ) -> Result<DetectionEvent, PipelineError> {
        self.store
            .append(camera_id, detection)
            .map_err(|e| PipelineError::PersistenceFailed(format!("{:#}", e)))
    }

    /// Record each detection, then run the deduper for each row written.
    ///
    /// Failures are logged and counted; they never stop the remaining detections.
    pub fn record_all(
        &self,
        camera: &CameraRecord,
        detections: &[Detection],
        summary: &mut RecordSummary,
    ) {
        for detection in detections {
            let event = match self.record(camera.id, detection) {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("camera={} {}", camera.id, e);
                    summary.persistence_failures += 1;
                    continue;
                }
            };
            summary.recorded += 1;
            match self.deduper.observe(camera, &event.alert_type) {
                Ok(AlertDecision::AlreadyAlerted) => {}
                Ok(AlertDecision::Dispatched(_)) => summary.alerts_dispatched += 1,
                Ok(AlertDecision::DispatchFailed(..)) => summary.dispatch_failures += 1,
                Err(e) => {
                    log::warn!(
                        "camera={} {}",
                        camera.id,
                        PipelineError::PersistenceFailed(format!("alert record: {:#}", e))
                    );
                    summary.persistence_failures += 1;
                }
            }
        }
    }
}

/// Batches queued ahead of the worker before `submit` blocks the session.
pub(crate) const RECORD_QUEUE_DEPTH: usize = 8;

/// Per-session worker that records off the rendering path.
pub(crate) struct RecordWorker {
    tx: SyncSender<Vec<Detection>>,
    handle: JoinHandle<RecordSummary>,
}

impl RecordWorker {
    pub(crate) fn spawn(recorder: Arc<DetectionRecorder>, camera: CameraRecord) -> Self {
        let (tx, rx) = sync_channel::<Vec<Detection>>(RECORD_QUEUE_DEPTH);
        let handle = std::thread::spawn(move || {
            let mut summary = RecordSummary::default();
            for batch in rx {
                recorder.record_all(&camera, &batch, &mut summary);
            }
            summary
        });
        Self { tx, handle }
    }

    /// Blocks while the queue is full.
    pub(crate) fn submit(&self, detections: Vec<Detection>) {
        if self.tx.send(detections).is_err() {
            log::error!("record worker exited early; detections dropped");
        }
    }

    /// Drain queued work and return the totals.
    pub(crate) fn finish(self) -> RecordSummary {
        drop(self.tx);
        match self.handle.join() {
            Ok(summary) => summary,
            Err(_) => {
                log::error!("record worker panicked");
                RecordSummary::default()
            }
        }
    }
}
