//! Remote inference over HTTP.
//!
//! Each frame is POSTed as `image/jpeg` to the configured endpoint, which answers with
//! `{"detections": [{"class_id": 0, "confidence": 0.83, "bbox": {"x": .., "y": .., "w": .., "h": ..}}]}`
//! in normalized coordinates.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::detect::backend::Detector;
use crate::detect::result::RawDetection;
use crate::frame::Frame;
use crate::render::encode_jpeg;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const UPLOAD_QUALITY: u8 = 85;

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    detections: Vec<RawDetection>,
}

pub struct HttpDetector {
    url: String,
    labels: Vec<String>,
    agent: ureq::Agent,
}

impl HttpDetector {
    pub fn new(url: impl Into<String>, labels: Vec<String>) -> Result<Self> {
        let url = url.into();
        url::Url::parse(&url).with_context(|| format!("invalid detector url {}", url))?;
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Ok(Self { url, labels, agent })
    }
}

impl Detector for HttpDetector {
    fn name(&self) -> &'static str {
        "http"
    }

    fn predict(&self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let body = encode_jpeg(frame.pixels(), frame.width, frame.height, UPLOAD_QUALITY)?;
        let response: PredictResponse = self
            .agent
            .post(&self.url)
            .set("Content-Type", "image/jpeg")
            .query("width", &frame.width.to_string())
            .query("height", &frame.height.to_string())
            .send_bytes(&body)
            .with_context(|| format!("post frame to {}", self.url))?
            .into_json()
            .context("decode detector response")?;
        for det in &response.detections {
            if !(0.0..=1.0).contains(&det.confidence) {
                return Err(anyhow!(
                    "detector returned confidence {} outside 0..=1",
                    det.confidence
                ));
            }
        }
        Ok(response.detections)
    }

    fn class_name(&self, class_id: usize) -> Option<&str> {
        self.labels.get(class_id).map(String::as_str)
    }
}
