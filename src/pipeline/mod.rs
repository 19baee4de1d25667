//! Session orchestration: source -> sampler -> detector -> filter -> {render, record + dedup}.

mod recorder;
mod session;
mod sink;

pub use recorder::{DetectionRecorder, RecordSummary};
pub use session::{
    FrameStream, PipelineContext, SessionOutcome, SessionState, StreamSession,
};
pub use sink::{ChannelSink, FrameSink, MultipartWriter, BOUNDARY, CONTENT_TYPE};
