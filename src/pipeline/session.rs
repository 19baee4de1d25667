//! One viewer's end-to-end run over one camera.
//!
//! ```text
//! Opening --resolve/open ok--> Streaming --feed ends--> EndedClean | EndedTimeout
//!    |                              |
//!    +--resolve/open failed--> EndedError      +--sink closed--> Cancelled
//! ```
//!
//! Every session emits at least one frame unless the viewer is already gone: when nothing
//! real was emitted, a placeholder frame is sent before ending.

use std::num::NonZeroU32;
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};

use super::recorder::{DetectionRecorder, RecordSummary, RecordWorker};
use super::sink::{ChannelSink, FrameSink};
use crate::detect::{detect_labeled, ConfidenceThresholds, Detector};
use crate::error::PipelineError;
use crate::ingest::{
    FeedEnd, FrameSampler, ReconnectingSource, RetryPolicy, SourceOpener, StreamAddress,
    UrlResolver,
};
use crate::render::{placeholder_message, Annotator};
use crate::storage::CameraRecord;

/// Everything a session borrows from the daemon. Shared by all sessions.
pub struct PipelineContext {
    pub opener: Arc<dyn SourceOpener>,
    pub resolver: Arc<dyn UrlResolver>,
    pub detector: Arc<dyn Detector>,
    pub thresholds: ConfidenceThresholds,
    pub annotator: Annotator,
    pub recorder: Arc<DetectionRecorder>,
    pub retry: RetryPolicy,
    pub sample_rate: NonZeroU32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Streaming,
    EndedClean,
    EndedTimeout,
    EndedError,
    /// The viewer closed the output.
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionState::Opening | SessionState::Streaming)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionOutcome {
    pub camera_id: i64,
    pub state: SessionState,
    pub error: Option<PipelineError>,
    pub frames_emitted: u64,
    pub frames_processed: u64,
    pub detections_accepted: u64,
    /// Message carried by the placeholder frame, when one was sent.
    pub placeholder: Option<String>,
    pub records: RecordSummary,
}

pub struct StreamSession {
    ctx: Arc<PipelineContext>,
    camera: CameraRecord,
    state: SessionState,
}

impl StreamSession {
    pub fn new(ctx: Arc<PipelineContext>, camera: CameraRecord) -> Self {
        Self {
            ctx,
            camera,
            state: SessionState::Opening,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        log::debug!(
            "session camera={} {:?} -> {:?}",
            self.camera.id,
            self.state,
            next
        );
        self.state = next;
    }

    /// Run to a terminal state, writing encoded frames to `sink`.
    pub fn run(mut self, sink: &mut dyn FrameSink) -> SessionOutcome {
        let mut outcome = SessionOutcome {
            camera_id: self.camera.id,
            state: SessionState::Opening,
            error: None,
            frames_emitted: 0,
            frames_processed: 0,
            detections_accepted: 0,
            placeholder: None,
            records: RecordSummary::default(),
        };

        match self.open() {
            Ok(source) => {
                self.transition(SessionState::Streaming);
                match FrameSampler::new(source, self.ctx.sample_rate.get()) {
                    Ok(sampler) => self.stream(sampler, sink, &mut outcome),
                    Err(e) => {
                        log::error!("session camera={} sampler: {:#}", self.camera.id, e);
                        self.transition(SessionState::EndedError);
                    }
                }
            }
            Err(e) => {
                log::warn!("session camera={} {}", self.camera.id, e);
                outcome.error = Some(e);
                self.transition(SessionState::EndedError);
            }
        }

        if outcome.frames_emitted == 0 && self.state != SessionState::Cancelled {
            self.emit_placeholder(sink, &mut outcome);
        }
        outcome.state = self.state;
        log::info!(
            "session camera={} ended state={:?} emitted={} processed={} recorded={}",
            self.camera.id,
            outcome.state,
            outcome.frames_emitted,
            outcome.frames_processed,
            outcome.records.recorded
        );
        outcome
    }

    fn open(&self) -> Result<ReconnectingSource, PipelineError> {
        let address = StreamAddress::classify(&self.camera.stream_address)
            .into_direct(self.ctx.resolver.as_ref())?;
        ReconnectingSource::open(self.ctx.opener.clone(), &address, self.ctx.retry)
    }

    fn stream(
        &mut self,
        mut sampler: FrameSampler<ReconnectingSource>,
        sink: &mut dyn FrameSink,
        outcome: &mut SessionOutcome,
    ) {
        let worker = RecordWorker::spawn(self.ctx.recorder.clone(), self.camera.clone());
        let next_state = loop {
            let frame = match sampler.next_frame() {
                Ok(frame) => frame,
                Err(FeedEnd::EndOfStream) => break SessionState::EndedClean,
                Err(FeedEnd::Timeout { waited }) => {
                    outcome.error = Some(PipelineError::StreamTimeout {
                        address: sampler.inner().address().to_string(),
                        waited_secs: waited.as_secs(),
                    });
                    break SessionState::EndedTimeout;
                }
            };
            outcome.frames_processed += 1;

            let detections = match detect_labeled(self.ctx.detector.as_ref(), &frame) {
                Ok(raw) => self.ctx.thresholds.filter(raw),
                Err(e) => {
                    log::warn!("session camera={} detector: {:#}", self.camera.id, e);
                    Vec::new()
                }
            };
            if !detections.is_empty() {
                outcome.detections_accepted += detections.len() as u64;
                worker.submit(detections.clone());
            }

            let jpeg = match self.ctx.annotator.render(frame, &detections) {
                Ok(jpeg) => jpeg,
                Err(e) => {
                    log::warn!("session camera={} render: {:#}", self.camera.id, e);
                    continue;
                }
            };
            if let Err(e) = sink.send(&jpeg) {
                log::info!("session camera={} viewer closed: {}", self.camera.id, e);
                break SessionState::Cancelled;
            }
            outcome.frames_emitted += 1;
        };
        // Release the capture handle before waiting on the recorder.
        drop(sampler);
        outcome.records = worker.finish();
        self.transition(next_state);
    }

    fn emit_placeholder(&mut self, sink: &mut dyn FrameSink, outcome: &mut SessionOutcome) {
        let message = placeholder_message(self.camera.id);
        match self.ctx.annotator.placeholder(&message) {
            Ok(jpeg) => match sink.send(&jpeg) {
                Ok(()) => {
                    outcome.frames_emitted += 1;
                    outcome.placeholder = Some(message);
                }
                Err(e) => {
                    log::info!("session camera={} viewer closed: {}", self.camera.id, e);
                    self.transition(SessionState::Cancelled);
                }
            },
            Err(e) => log::error!("session camera={} placeholder: {:#}", self.camera.id, e),
        }
    }

    /// Run on a dedicated thread and expose the output as a pull iterator.
    pub fn spawn(self) -> FrameStream {
        let (tx, rx) = sync_channel(1);
        let handle = std::thread::spawn(move || {
            let mut sink = ChannelSink::new(tx);
            self.run(&mut sink)
        });
        FrameStream { rx, handle }
    }
}

/// Encoded frames of a running session, in order. Ends when the session ends.
///
/// Dropping the stream closes the session's sink, which cancels it and releases its source.
pub struct FrameStream {
    rx: Receiver<Vec<u8>>,
    handle: JoinHandle<SessionOutcome>,
}

impl FrameStream {
    /// Stop consuming and wait for the session to wind down.
    pub fn finish(self) -> Result<SessionOutcome> {
        let FrameStream { rx, handle } = self;
        drop(rx);
        handle
            .join()
            .map_err(|_| anyhow!("stream session thread panicked"))
    }
}

impl Iterator for FrameStream {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().ok()
    }
}
