mod backend;
pub mod backends;
mod filter;
mod result;

use std::sync::Arc;

use anyhow::{anyhow, Result};

pub use backend::{detect_labeled, Detector};
pub use backends::{HttpDetector, NullDetector, ScriptedDetector};
pub use filter::ConfidenceThresholds;
pub use result::{BoundingBox, Detection, RawDetection};

use crate::config::DetectorConfig;

/// Build the detector named by the configuration.
pub fn build_detector(config: &DetectorConfig) -> Result<Arc<dyn Detector>> {
    let detector: Arc<dyn Detector> = match config.backend.as_str() {
        "null" => Arc::new(NullDetector::new(config.labels.clone())),
        "http" => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| anyhow!("http detector requires detector.url"))?;
            Arc::new(HttpDetector::new(url, config.labels.clone())?)
        }
        other => return Err(anyhow!("unknown detector backend '{}'", other)),
    };
    detector.warm_up()?;
    log::info!("detector backend: {}", detector.name());
    Ok(detector)
}
