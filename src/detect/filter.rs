//! Per-label confidence gate.
//!
//! The threshold map is a safelist: a label with no entry is always rejected.

use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::detect::result::Detection;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfidenceThresholds(BTreeMap<String, f32>);

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self::from_pairs([("fire", 0.2), ("smoke", 0.2)])
    }
}

impl ConfidenceThresholds {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, f32)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(label, min)| (label.to_string(), min))
                .collect(),
        )
    }

    pub fn get(&self, label: &str) -> Option<f32> {
        self.0.get(label).copied()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn accepts(&self, label: &str, confidence: f32) -> bool {
        self.get(label).is_some_and(|min| confidence >= min)
    }

    /// Keep accepted detections, in their original order.
    pub fn filter(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections
            .into_iter()
            .filter(|d| self.accepts(&d.label, d.confidence))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        for (label, min) in &self.0 {
            if label.trim().is_empty() {
                return Err(anyhow!("threshold label must not be empty"));
            }
            if !(0.0..=1.0).contains(min) {
                return Err(anyhow!(
                    "threshold for '{}' must be within 0..=1 (got {})",
                    label,
                    min
                ));
            }
        }
        Ok(())
    }
}

/// Parses `fire=0.2,smoke=0.3`.
impl FromStr for ConfidenceThresholds {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut map = BTreeMap::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (label, value) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("threshold entry '{}' is not label=value", entry))?;
            let min: f32 = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("threshold for '{}' is not a number", label.trim()))?;
            map.insert(label.trim().to_string(), min);
        }
        let thresholds = Self(map);
        thresholds.validate()?;
        Ok(thresholds)
    }
}
