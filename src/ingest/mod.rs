//! Frame ingestion.
//!
//! Sources turn a stream address into a sequence of decoded `Frame`s:
//! - `stub://` synthetic sources (demos and tests)
//! - RTSP / HTTP / local files / V4L2 devices through GStreamer (feature: rtsp-gstreamer)
//!
//! Resolvable addresses (video hosting pages) go through a `UrlResolver` first. The
//! `ReconnectingSource` wraps a single opened source with the open-retry, single-reconnect and
//! staleness rules, and the `FrameSampler` forwards one frame in every K.
//!
//! The ingestion layer MUST:
//! - Release the capture resource on every exit path (drop included)
//! - Keep at most one frame in flight per session (no buffering ahead)

use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

#[cfg(feature = "rtsp-gstreamer")]
pub mod gstreamer;
pub mod reconnect;
pub mod resolve;
pub mod sampler;
pub mod synthetic;

#[cfg(feature = "rtsp-gstreamer")]
pub use self::gstreamer::GstreamerSource;
pub use reconnect::{ReconnectingSource, RetryPolicy};
pub use resolve::{StreamAddress, UrlResolver, YtDlpResolver};
pub use sampler::FrameSampler;
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// An opened capture handle.
pub trait FrameSource: Send {
    /// Read the next frame, waiting at most `timeout`.
    ///
    /// `Ok(None)` means the upstream closed cleanly. `Err` means a frame was not delivered
    /// (decode error, network drop, stall).
    fn read(&mut self, timeout: Duration) -> Result<Option<Frame>>;

    /// Release the capture resource. Must be idempotent.
    fn close(&mut self);
}

/// Opens capture handles for direct (already resolved) addresses.
pub trait SourceOpener: Send + Sync {
    fn open(&self, address: &str) -> Result<Box<dyn FrameSource>>;
}

/// Why a feed stopped producing frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedEnd {
    /// Upstream closed, or a read failure could not be recovered by reconnecting.
    EndOfStream,
    /// No frame arrived within the staleness bound.
    Timeout { waited: Duration },
}

#[derive(Debug)]
pub enum FeedItem {
    Frame(Frame),
    End(FeedEnd),
}

/// Pull interface shared by the reconnecting source and the sampler.
pub trait FrameFeed {
    fn next_item(&mut self) -> FeedItem;
}

/// Opener used by the daemon: `stub://` goes to the synthetic source, everything else to
/// GStreamer when it is compiled in.
#[derive(Clone, Debug, Default)]
pub struct DefaultOpener;

impl SourceOpener for DefaultOpener {
    fn open(&self, address: &str) -> Result<Box<dyn FrameSource>> {
        if address.starts_with("stub://") {
            let config = SyntheticConfig::from_address(address)?;
            return Ok(Box::new(SyntheticSource::open(config)?));
        }
        #[cfg(feature = "rtsp-gstreamer")]
        {
            Ok(Box::new(GstreamerSource::open(address)?))
        }
        #[cfg(not(feature = "rtsp-gstreamer"))]
        {
            Err(anyhow!(
                "opening {} requires the rtsp-gstreamer feature",
                address
            ))
        }
    }
}
