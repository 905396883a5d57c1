use serde::Serialize;
use std::time::UNIX_EPOCH;

use crate::policy::CaptureResult;

/// What a captured product looks like to downstream consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProductContext {
    pub name: String,
    pub confidence_pct: u32,
    /// Distinct labels of the other accepted detections, best first.
    pub features: Vec<String>,
    pub source: String,
    pub captured_at_ms: u64,
}

impl ProductContext {
    pub fn from_capture(capture: &CaptureResult) -> Self {
        let mut features: Vec<String> = Vec::new();
        for detection in capture.all_detections.iter() {
            if detection.label != capture.primary_label && !features.contains(&detection.label) {
                features.push(detection.label.clone());
            }
        }

        let captured_at_ms = capture
            .captured_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            name: capture.primary_label.clone(),
            confidence_pct: (capture.confidence.clamp(0.0, 1.0) * 100.0).round() as u32,
            features,
            source: capture.all_detections.source().to_string(),
            captured_at_ms,
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
