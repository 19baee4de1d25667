use anyhow::Result;

use crate::detect::result::{Detection, RawDetection};
use crate::frame::Frame;

/// Object-detection capability consumed by stream sessions.
///
/// One detector instance is shared by every session, so `predict` takes `&self` and
/// implementations must not hold frame data past the call.
pub trait Detector: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn predict(&self, frame: &Frame) -> Result<Vec<RawDetection>>;

    /// Label for a class id, if the model knows it.
    fn class_name(&self, class_id: usize) -> Option<&str>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}

/// Run `detector` on `frame` and attach labels and the frame timestamp.
///
/// Class ids without a name become `class_<id>`; the confidence filter rejects them later
/// unless a threshold is configured under that name.
pub fn detect_labeled(detector: &dyn Detector, frame: &Frame) -> Result<Vec<Detection>> {
    let raw = detector.predict(frame)?;
    Ok(raw
        .into_iter()
        .map(|d| Detection {
            label: detector
                .class_name(d.class_id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("class_{}", d.class_id)),
            confidence: d.confidence,
            bbox: d.bbox,
            frame_timestamp: frame.captured_at,
        })
        .collect())
}
