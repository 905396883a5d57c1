use serde::Serialize;

use crate::frame::FrameSize;

/// Axis-aligned box in source-frame pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// One candidate object found in a frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    /// 0..=1
    pub confidence: f32,
    #[serde(rename = "bounding_box")]
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    /// Confidence as a whole percentage, the way labels display it.
    pub fn percent(&self) -> u32 {
        (self.confidence * 100.0).round().clamp(0.0, 100.0) as u32
    }
}

/// Detections for one frame, sorted by descending confidence.
///
/// Ties keep the order the backend reported them in.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DetectionSet {
    detections: Vec<Detection>,
    frame_size: FrameSize,
    frame_sequence: u64,
    source: String,
}

impl DetectionSet {
    /// Build a set from backend output, sorting it.
    pub fn from_unsorted(
        mut detections: Vec<Detection>,
        frame_size: FrameSize,
        frame_sequence: u64,
        source: impl Into<String>,
    ) -> Self {
        // `sort_by` is stable, which preserves first-seen order on ties.
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Self {
            detections,
            frame_size,
            frame_sequence,
            source: source.into(),
        }
    }

    /// Empty set for a frame where nothing usable was detected.
    pub fn empty(frame_size: FrameSize, frame_sequence: u64) -> Self {
        Self {
            frame_size,
            frame_sequence,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.detections
    }

    /// Highest-confidence detection (first in sort order).
    pub fn best(&self) -> Option<&Detection> {
        self.detections.first()
    }

    /// Sub-set of detections strictly above `threshold`, order preserved.
    pub fn above(&self, threshold: f32) -> DetectionSet {
        DetectionSet {
            detections: self
                .detections
                .iter()
                .filter(|d| d.confidence > threshold)
                .cloned()
                .collect(),
            frame_size: self.frame_size,
            frame_sequence: self.frame_sequence,
            source: self.source.clone(),
        }
    }

    /// Keep only the `max` most confident detections.
    pub fn truncate(&mut self, max: usize) {
        self.detections.truncate(max);
    }

    pub fn frame_size(&self) -> FrameSize {
        self.frame_size
    }

    pub fn frame_sequence(&self) -> u64 {
        self.frame_sequence
    }

    /// Name of the backend that produced the set.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// "bottle (82%), cup (41%)"
    pub fn summary(&self) -> String {
        self.detections
            .iter()
            .map(|d| format!("{} ({}%)", d.label, d.percent()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, confidence: f32) -> Detection {
        Detection::new(label, confidence, BoundingBox::new(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn sorts_descending_with_stable_ties() {
        let set = DetectionSet::from_unsorted(
            vec![det("a", 0.4), det("b", 0.9), det("c", 0.4), det("d", 0.6)],
            FrameSize::new(64, 64),
            3,
            "stub",
        );
        let labels: Vec<_> = set.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "d", "a", "c"]);
        assert_eq!(set.best().map(|d| d.label.as_str()), Some("b"));
        assert_eq!(set.frame_sequence(), 3);
    }

    #[test]
    fn above_is_strict_and_keeps_order() {
        let set = DetectionSet::from_unsorted(
            vec![det("a", 0.5), det("b", 0.9), det("c", 0.49), det("d", 0.51)],
            FrameSize::new(64, 64),
            1,
            "stub",
        );
        let kept = set.above(0.5);
        let labels: Vec<_> = kept.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "d"]);
        assert_eq!(kept.source(), "stub");
    }

    #[test]
    fn summary_rounds_to_whole_percent() {
        let set = DetectionSet::from_unsorted(
            vec![det("bottle", 0.824), det("cup", 0.41)],
            FrameSize::new(64, 64),
            1,
            "stub",
        );
        assert_eq!(set.summary(), "bottle (82%), cup (41%)");
    }
}
