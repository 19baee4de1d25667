#![allow(dead_code)]

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};

use hazard_watch::alert::{AlertDeduper, AlertDispatcher, Notification, NotificationTemplate};
use hazard_watch::detect::{ConfidenceThresholds, Detector, ScriptedDetector};
use hazard_watch::frame::Frame;
use hazard_watch::ingest::{FrameSource, RetryPolicy, SourceOpener, UrlResolver};
use hazard_watch::pipeline::{DetectionRecorder, PipelineContext};
use hazard_watch::render::Annotator;
use hazard_watch::storage::{
    AlertRecordStore, CameraRecord, DetectionStore, InMemoryAlertRecordStore,
    InMemoryDetectionStore,
};

#[derive(Clone, Copy, Debug)]
pub enum Step {
    Frame,
    Fail,
    /// Block for the whole read timeout, then fail.
    Stall,
    End,
}

/// Counters shared between an opener and the sources it hands out.
#[derive(Default)]
pub struct OpenerStats {
    pub open_calls: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

impl OpenerStats {
    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

enum Plan {
    Refuse,
    Script(Vec<Step>),
    Endless,
}

/// Opener driven by a queue of plans, one per `open` call. An empty queue refuses.
pub struct ScriptedOpener {
    plans: Mutex<VecDeque<Plan>>,
    pub stats: Arc<OpenerStats>,
}

impl ScriptedOpener {
    pub fn new() -> Self {
        Self {
            plans: Mutex::new(VecDeque::new()),
            stats: Arc::new(OpenerStats::default()),
        }
    }

    pub fn refuse(self) -> Self {
        self.push(Plan::Refuse)
    }

    pub fn script(self, steps: &[Step]) -> Self {
        self.push(Plan::Script(steps.to_vec()))
    }

    /// A source that never runs out of frames.
    pub fn endless(self) -> Self {
        self.push(Plan::Endless)
    }

    /// `count` frames then a clean end.
    pub fn frames(self, count: usize) -> Self {
        let mut steps = vec![Step::Frame; count];
        steps.push(Step::End);
        self.script(&steps)
    }

    fn push(self, plan: Plan) -> Self {
        self.plans.lock().unwrap().push_back(plan);
        self
    }
}

impl SourceOpener for ScriptedOpener {
    fn open(&self, address: &str) -> Result<Box<dyn FrameSource>> {
        self.stats.open_calls.fetch_add(1, Ordering::SeqCst);
        let plan = self.plans.lock().unwrap().pop_front();
        let steps = match plan {
            Some(Plan::Script(steps)) => Some(steps.into()),
            Some(Plan::Endless) => None,
            Some(Plan::Refuse) | None => return Err(anyhow!("{} refused connection", address)),
        };
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            steps,
            stats: self.stats.clone(),
            closed: false,
            emitted: 0,
        }))
    }
}

struct ScriptedSource {
    /// `None` means endless.
    steps: Option<VecDeque<Step>>,
    stats: Arc<OpenerStats>,
    closed: bool,
    emitted: u64,
}

impl FrameSource for ScriptedSource {
    fn read(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        if self.closed {
            return Err(anyhow!("read after close"));
        }
        let step = match self.steps.as_mut() {
            Some(steps) => steps.pop_front().unwrap_or(Step::End),
            None => Step::Frame,
        };
        match step {
            Step::Frame => {
                self.emitted += 1;
                Ok(Some(Frame::filled(32, 24, self.emitted, [60, 90, 120])?))
            }
            Step::Fail => Err(anyhow!("decode error")),
            Step::Stall => {
                std::thread::sleep(timeout);
                Err(anyhow!("no frame within {}ms", timeout.as_millis()))
            }
            Step::End => Ok(None),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Resolver that always fails.
pub struct FailingResolver;

impl UrlResolver for FailingResolver {
    fn resolve(&self, address: &str) -> Result<String> {
        Err(anyhow!("no playable format for {}", address))
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    pub sent: Mutex<Vec<Notification>>,
    pub fail: bool,
}

impl RecordingDispatcher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl AlertDispatcher for RecordingDispatcher {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn dispatch(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail {
            return Err(anyhow!("mail relay unreachable"));
        }
        Ok(())
    }
}

pub fn camera(id: i64, region_id: i64, sub_region_id: i64) -> CameraRecord {
    CameraRecord {
        id,
        name: format!("Camera {}", id),
        stream_address: format!("rtsp://10.0.0.{}/live", id),
        region_id,
        sub_region_id,
        active: true,
    }
}

pub fn labels() -> Vec<String> {
    vec!["fire".to_string(), "smoke".to_string()]
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_open_attempts: 3,
        retry_delay: Duration::from_millis(5),
        staleness: Duration::from_secs(5),
    }
}

/// A pipeline over in-memory stores, with handles kept for assertions.
pub struct Harness {
    pub ctx: Arc<PipelineContext>,
    pub detections: Arc<InMemoryDetectionStore>,
    pub alerts: Arc<InMemoryAlertRecordStore>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

pub struct HarnessBuilder {
    opener: Arc<dyn SourceOpener>,
    detector: Arc<dyn Detector>,
    resolver: Arc<dyn UrlResolver>,
    dispatcher: Arc<RecordingDispatcher>,
    sample_rate: u32,
    retry: RetryPolicy,
}

impl HarnessBuilder {
    pub fn new(opener: Arc<dyn SourceOpener>) -> Self {
        Self {
            opener,
            detector: Arc::new(ScriptedDetector::new(labels(), Vec::new())),
            resolver: Arc::new(FailingResolver),
            dispatcher: Arc::new(RecordingDispatcher::default()),
            sample_rate: 1,
            retry: fast_retry(),
        }
    }

    pub fn detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn dispatcher(mut self, dispatcher: RecordingDispatcher) -> Self {
        self.dispatcher = Arc::new(dispatcher);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn UrlResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn build(self) -> Harness {
        let detections = Arc::new(InMemoryDetectionStore::new());
        let alerts = Arc::new(InMemoryAlertRecordStore::new());
        let deduper = Arc::new(AlertDeduper::new(
            alerts.clone() as Arc<dyn AlertRecordStore>,
            self.dispatcher.clone() as Arc<dyn AlertDispatcher>,
            NotificationTemplate::default(),
        ));
        let recorder = Arc::new(DetectionRecorder::new(
            detections.clone() as Arc<dyn DetectionStore>,
            deduper,
        ));
        let ctx = PipelineContext {
            opener: self.opener,
            resolver: self.resolver,
            detector: self.detector,
            thresholds: ConfidenceThresholds::default(),
            annotator: Annotator::default(),
            recorder,
            retry: self.retry,
            sample_rate: NonZeroU32::new(self.sample_rate).unwrap(),
        };
        Harness {
            ctx: Arc::new(ctx),
            detections,
            alerts,
            dispatcher: self.dispatcher,
        }
    }
}
