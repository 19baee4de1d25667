use thiserror::Error;

/// Failure kinds surfaced by the detection pipeline.
///
/// Terminal kinds (`ResolutionFailed`, `ConnectFailed`, `StreamTimeout`) end a session after a
/// placeholder frame or a clean close. `PersistenceFailed` and `DispatchFailed` are logged and
/// never end a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("could not resolve stream address {address}: {reason}")]
    ResolutionFailed { address: String, reason: String },

    #[error("could not open {address} after {attempts} attempts: {reason}")]
    ConnectFailed {
        address: String,
        attempts: u32,
        reason: String,
    },

    #[error("no frame from {address} for {waited_secs}s")]
    StreamTimeout { address: String, waited_secs: u64 },

    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("alert dispatch failed: {0}")]
    DispatchFailed(String),
}

impl PipelineError {
    /// Terminal errors end the session they occur in.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineError::ResolutionFailed { .. }
                | PipelineError::ConnectFailed { .. }
                | PipelineError::StreamTimeout { .. }
        )
    }
}
