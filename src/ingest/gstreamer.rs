//! GStreamer-backed capture for RTSP, HTTP(S), local files and V4L2 devices.
//!
//! Every pipeline ends in `videoconvert ! video/x-raw,format=RGB ! appsink` with a single-buffer,
//! drop-oldest appsink, so a slow consumer never builds up latency.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use gstreamer::prelude::*;
use gstreamer::ClockTime;

use super::FrameSource;
use crate::frame::Frame;

/// How long `open` waits for the pipeline to reach PAUSED or PLAYING.
const START_TIMEOUT: ClockTime = ClockTime::from_seconds(5);

const SINK_TAIL: &str = "videoconvert ! video/x-raw,format=RGB ! \
                         appsink name=appsink sync=false max-buffers=1 drop=true";

pub struct GstreamerSource {
    address: String,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    frame_count: u64,
    closed: bool,
}

impl GstreamerSource {
    pub fn open(address: &str) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let description = pipeline_description(address)?;
        let pipeline = gstreamer::parse::launch(&description)
            .with_context(|| format!("build pipeline for {}", address))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("capture pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));

        let started = pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| e.to_string())
            .and_then(|_| {
                let (result, current, _pending) = pipeline.state(START_TIMEOUT);
                start_outcome(result, current)
            });
        if let Err(reason) = started {
            let detail = pipeline
                .bus()
                .and_then(|bus| pending_error(&bus))
                .unwrap_or(reason);
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(anyhow!("start pipeline for {}: {}", address, detail));
        }
        log::info!("gstreamer source playing: {}", address);

        Ok(Self {
            address: address.to_string(),
            pipeline,
            appsink,
            frame_count: 0,
            closed: false,
        })
    }

    /// Drain pending bus messages; `Ok(true)` on end of stream.
    fn poll_bus(&self) -> Result<bool> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(false);
        };
        while let Some(message) = bus.timed_pop(ClockTime::ZERO) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    return Err(anyhow!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    ));
                }
                MessageView::Eos(..) => return Ok(true),
                _ => {}
            }
        }
        Ok(false)
    }
}

impl FrameSource for GstreamerSource {
    fn read(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        if self.closed {
            return Err(anyhow!("{} read after close", self.address));
        }
        if self.poll_bus()? {
            return Ok(None);
        }
        let wait = ClockTime::from_mseconds(timeout.as_millis().min(u64::MAX as u128) as u64);
        let Some(sample) = self.appsink.try_pull_sample(wait) else {
            if self.appsink.is_eos() {
                return Ok(None);
            }
            return Err(anyhow!(
                "no frame from {} within {}ms",
                self.address,
                timeout.as_millis()
            ));
        };
        let (pixels, width, height) = sample_to_pixels(&sample)?;
        self.frame_count += 1;
        Ok(Some(Frame::new(pixels, width, height, self.frame_count)?))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("gstreamer source {} did not stop cleanly: {}", self.address, e);
        }
        log::debug!(
            "gstreamer source closed: {} after {} frames",
            self.address,
            self.frame_count
        );
    }
}

impl Drop for GstreamerSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Network sources change state asynchronously; only a settled PAUSED or PLAYING counts as open.
fn start_outcome(
    result: Result<gstreamer::StateChangeSuccess, gstreamer::StateChangeError>,
    current: gstreamer::State,
) -> std::result::Result<(), String> {
    match result {
        Err(e) => Err(e.to_string()),
        Ok(gstreamer::StateChangeSuccess::Async) => Err(format!(
            "not prerolled within {}s",
            START_TIMEOUT.seconds()
        )),
        Ok(_) if matches!(current, gstreamer::State::Playing | gstreamer::State::Paused) => Ok(()),
        Ok(_) => Err(format!("pipeline stuck in {:?}", current)),
    }
}

/// First error message already posted on the bus, if any.
fn pending_error(bus: &gstreamer::Bus) -> Option<String> {
    while let Some(message) = bus.timed_pop(ClockTime::ZERO) {
        if let gstreamer::MessageView::Error(err) = message.view() {
            return Some(format!(
                "gstreamer error from {:?}: {}",
                err.src().map(|s| s.path_string()),
                err.error()
            ));
        }
    }
    None
}

fn pipeline_description(address: &str) -> Result<String> {
    let head = if let Some(device) = v4l2_device(address) {
        format!("v4l2src device={}", quote(&device))
    } else if address.starts_with("rtsp://") || address.starts_with("rtsps://") {
        format!("rtspsrc location={} latency=0 ! decodebin", quote(address))
    } else if address.contains("://") {
        format!("uridecodebin uri={}", quote(address))
    } else {
        let path = std::fs::canonicalize(address)
            .with_context(|| format!("resolve local video path {}", address))?;
        let uri = url::Url::from_file_path(&path)
            .map_err(|_| anyhow!("cannot express {} as a file uri", path.display()))?;
        format!("uridecodebin uri={}", quote(uri.as_str()))
    };
    Ok(format!("{} ! {}", head, SINK_TAIL))
}

/// `/dev/videoN` paths and bare device indices ("0") select a V4L2 device.
fn v4l2_device(address: &str) -> Option<String> {
    if address.starts_with("/dev/video") {
        return Some(address.to_string());
    }
    address
        .parse::<u32>()
        .ok()
        .map(|index| format!("/dev/video{}", index))
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn sample_to_pixels(sample: &gstreamer::Sample) -> Result<(Vec<u8>, u32, u32)> {
    let buffer = sample.buffer().context("sample missing buffer")?;
    let caps = sample.caps().context("sample missing caps")?;
    let info = gstreamer_video::VideoInfo::from_caps(caps).context("parse caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map sample buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data.get(..len).context("sample buffer is truncated")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("sample buffer row is out of bounds")?,
        );
    }
    Ok((pixels, width, height))
}
