//! Capture decision policy.
//!
//! The capture threshold is stricter than the detector's reporting floor, so
//! weak detections still show up in the overlay but can never be captured.

use std::time::SystemTime;

use crate::detect::{BoundingBox, DetectionSet};
use crate::error::CaptureRejection;
use crate::frame::Frame;

/// Minimum confidence (inclusive) for a capture to be accepted.
pub const DEFAULT_CAPTURE_THRESHOLD: f32 = 0.5;

/// A finalized capture handed to the caller.
#[derive(Clone, Debug)]
pub struct CaptureResult {
    pub primary_label: String,
    pub confidence: f32,
    pub primary_box: BoundingBox,
    /// Full frame the detections were computed on.
    pub snapshot: Frame,
    /// Detections strictly above the capture threshold, best first.
    pub all_detections: DetectionSet,
    pub captured_at: SystemTime,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CapturePolicy {
    threshold: f32,
}

impl CapturePolicy {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Decide whether `detections` (computed on `snapshot`) are good enough
    /// to finalize a capture.
    pub fn decide(
        &self,
        detections: &DetectionSet,
        snapshot: &Frame,
    ) -> Result<CaptureResult, CaptureRejection> {
        let best = detections.best().ok_or(CaptureRejection::NoDetections)?;
        if best.confidence < self.threshold {
            return Err(CaptureRejection::LowConfidence {
                confidence: best.confidence,
                threshold: self.threshold,
            });
        }

        Ok(CaptureResult {
            primary_label: best.label.clone(),
            confidence: best.confidence,
            primary_box: best.bbox,
            snapshot: snapshot.clone(),
            all_detections: detections.above(self.threshold),
            captured_at: SystemTime::now(),
        })
    }
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;
    use crate::frame::FrameSize;

    fn frame() -> Frame {
        Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, 9)
    }

    fn set(detections: Vec<(&str, f32)>) -> DetectionSet {
        DetectionSet::from_unsorted(
            detections
                .into_iter()
                .map(|(label, c)| Detection::new(label, c, BoundingBox::new(0.0, 0.0, 2.0, 2.0)))
                .collect(),
            FrameSize::new(4, 4),
            9,
            "scripted",
        )
    }

    #[test]
    fn empty_set_is_rejected() {
        let err = CapturePolicy::default()
            .decide(&set(vec![]), &frame())
            .unwrap_err();
        assert_eq!(err, CaptureRejection::NoDetections);
    }

    #[test]
    fn threshold_is_inclusive() {
        let policy = CapturePolicy::default();
        let ok = policy.decide(&set(vec![("jar", 0.5)]), &frame()).unwrap();
        assert_eq!(ok.primary_label, "jar");
        assert!(ok.all_detections.is_empty());

        let err = policy
            .decide(&set(vec![("jar", 0.4999)]), &frame())
            .unwrap_err();
        assert!(matches!(err, CaptureRejection::LowConfidence { .. }));
    }

    #[test]
    fn accepted_capture_keeps_only_strong_detections() {
        let result = CapturePolicy::default()
            .decide(
                &set(vec![("cup", 0.41), ("bottle", 0.82), ("can", 0.66)]),
                &frame(),
            )
            .unwrap();

        assert_eq!(result.primary_label, "bottle");
        assert_eq!(result.confidence, 0.82);
        let labels: Vec<_> = result
            .all_detections
            .iter()
            .map(|d| d.label.as_str())
            .collect();
        assert_eq!(labels, vec!["bottle", "can"]);
        assert_eq!(result.snapshot.sequence, 9);
    }

    #[test]
    fn detections_at_threshold_are_accepted_but_not_supporting() {
        let result = CapturePolicy::default()
            .decide(&set(vec![("jar", 0.5), ("lid", 0.5)]), &frame())
            .unwrap();
        assert_eq!(result.primary_label, "jar");
        assert_eq!(result.confidence, 0.5);
        assert!(result.all_detections.is_empty());
    }

    #[test]
    fn low_confidence_reports_values() {
        let err = CapturePolicy::default()
            .decide(&set(vec![("box", 0.35)]), &frame())
            .unwrap_err();
        assert_eq!(
            err,
            CaptureRejection::LowConfidence {
                confidence: 0.35,
                threshold: 0.5
            }
        );
        assert_eq!(
            err.to_string(),
            "detection confidence too low (0.35 < 0.50)"
        );
    }
}
