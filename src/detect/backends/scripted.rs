use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use crate::detect::backend::Detector;
use crate::detect::result::{BoundingBox, RawDetection};
use crate::frame::Frame;

/// Deterministic detector for tests and demos.
///
/// Each `predict` call pops the next scripted result; once the script is exhausted every call
/// returns the `repeat` list (empty unless built with `repeating`).
pub struct ScriptedDetector {
    labels: Vec<String>,
    script: Mutex<VecDeque<Vec<RawDetection>>>,
    repeat: Vec<RawDetection>,
    calls: AtomicU64,
}

impl ScriptedDetector {
    pub fn new(labels: Vec<String>, script: Vec<Vec<RawDetection>>) -> Self {
        Self {
            labels,
            script: Mutex::new(script.into()),
            repeat: Vec::new(),
            calls: AtomicU64::new(0),
        }
    }

    pub fn repeating(labels: Vec<String>, detections: Vec<RawDetection>) -> Self {
        Self {
            repeat: detections,
            ..Self::new(labels, Vec::new())
        }
    }

    /// A centered detection of `class_id`.
    pub fn hit(class_id: usize, confidence: f32) -> RawDetection {
        RawDetection {
            class_id,
            confidence,
            bbox: BoundingBox::new(0.25, 0.25, 0.5, 0.5),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn predict(&self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .map_err(|_| anyhow!("scripted detector lock poisoned"))?
            .pop_front();
        Ok(next.unwrap_or_else(|| self.repeat.clone()))
    }

    fn class_name(&self, class_id: usize) -> Option<&str> {
        self.labels.get(class_id).map(String::as_str)
    }
}
