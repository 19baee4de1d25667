use anyhow::Result;

use crate::detect::backend::Detector;
use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Detector that never finds anything. Streams still render and flow; nothing is recorded.
pub struct NullDetector {
    labels: Vec<String>,
}

impl NullDetector {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }
}

impl Default for NullDetector {
    fn default() -> Self {
        Self::new(vec!["fire".to_string(), "smoke".to_string()])
    }
}

impl Detector for NullDetector {
    fn name(&self) -> &'static str {
        "null"
    }

    fn predict(&self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        Ok(Vec::new())
    }

    fn class_name(&self, class_id: usize) -> Option<&str> {
        self.labels.get(class_id).map(String::as_str)
    }
}
