//! Hazard Watch
//!
//! Live hazard detection over camera streams with deduplicated alerting.
//!
//! # Architecture
//!
//! Each viewer of `/video_feed/{id}` gets its own `StreamSession`:
//!
//! 1. **Ingest**: resolve the camera address, open it with bounded retries, reconnect once on a
//!    failed read, and time out when the stream goes stale.
//! 2. **Sample**: only every K-th frame goes further.
//! 3. **Detect + filter**: the `Detector` capability labels the frame; per-label confidence
//!    thresholds (a safelist) decide what is accepted.
//! 4. **Render**: accepted detections are drawn and the frame is JPEG-encoded for the viewer.
//! 5. **Record + alert**: every accepted detection is persisted; the first one per
//!    (camera, region, sub-region) claims an alert record and dispatches a notification.
//!
//! # Module Structure
//!
//! - `frame`: decoded RGB frames
//! - `ingest`: sources, reconnection, sampling, URL resolution
//! - `detect`: detector capability, backends, confidence thresholds
//! - `render`: annotation, placeholder frames, JPEG encoding
//! - `storage`: SQLite camera directory, detection events, alert records
//! - `alert`: deduper and notification dispatchers
//! - `pipeline`: recorder, stream session, frame sinks
//! - `api`: viewer HTTP server
//! - `config`: daemon configuration

use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::{anyhow, Result};

pub mod alert;
pub mod api;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod render;
pub mod storage;

pub use alert::{AlertDecision, AlertDeduper, AlertDispatcher, AlertKey, AlertRecord};
pub use config::WatchdConfig;
pub use detect::{ConfidenceThresholds, Detection, Detector};
pub use error::PipelineError;
pub use frame::Frame;
pub use ingest::{FrameSampler, FrameSource, ReconnectingSource, RetryPolicy, SourceOpener};
pub use pipeline::{FrameStream, PipelineContext, SessionOutcome, SessionState, StreamSession};
pub use render::Annotator;
pub use storage::{
    CameraDirectory, SqliteAlertRecordStore, SqliteCameraDirectory, SqliteDetectionStore,
};

/// Long-lived collaborators shared by every session of the daemon.
pub struct Services {
    pub cameras: Arc<dyn CameraDirectory>,
    pub pipeline: Arc<PipelineContext>,
}

/// Build the alert dispatcher named by the configuration.
pub fn build_dispatcher(cfg: &config::AlertSettings) -> Result<Arc<dyn AlertDispatcher>> {
    let dispatcher: Arc<dyn AlertDispatcher> = match cfg.dispatcher.as_str() {
        "log" => Arc::new(alert::LogDispatcher),
        "mqtt" => Arc::new(alert::MqttDispatcher::connect(
            &cfg.mqtt_broker_addr,
            &cfg.mqtt_topic,
            &format!("hazard-watch-{:08x}", rand::random::<u32>()),
        )?),
        "webhook" => {
            let url = cfg
                .webhook_url
                .as_deref()
                .ok_or_else(|| anyhow!("webhook dispatcher requires alerts.webhook_url"))?;
            Arc::new(alert::WebhookDispatcher::new(url)?)
        }
        other => return Err(anyhow!("unknown alert dispatcher '{}'", other)),
    };
    Ok(dispatcher)
}

/// Open stores, detector and dispatcher for `cfg`.
pub fn open_services(cfg: &WatchdConfig) -> Result<Services> {
    let cameras = Arc::new(SqliteCameraDirectory::open(&cfg.db_path)?);
    let detections = Arc::new(SqliteDetectionStore::open(&cfg.db_path)?);
    let alert_records = Arc::new(SqliteAlertRecordStore::open(&cfg.db_path)?);

    let deduper = Arc::new(AlertDeduper::new(
        alert_records,
        build_dispatcher(&cfg.alerts)?,
        alert::NotificationTemplate {
            recipients: cfg.alerts.recipients.clone(),
            subject: cfg.alerts.subject.clone(),
        },
    ));
    let recorder = Arc::new(pipeline::DetectionRecorder::new(detections, deduper));

    let pipeline = PipelineContext {
        opener: Arc::new(ingest::DefaultOpener),
        resolver: Arc::new(ingest::YtDlpResolver::new(cfg.resolver_program.clone())),
        detector: detect::build_detector(&cfg.detector)?,
        thresholds: cfg.thresholds.clone(),
        annotator: Annotator::new(
            cfg.render.jpeg_quality,
            cfg.render.placeholder_width,
            cfg.render.placeholder_height,
        )?,
        recorder,
        retry: cfg.source.retry_policy(),
        sample_rate: NonZeroU32::new(cfg.sample_rate)
            .ok_or_else(|| anyhow!("sampling rate must be at least 1"))?,
    };

    Ok(Services {
        cameras,
        pipeline: Arc::new(pipeline),
    })
}
