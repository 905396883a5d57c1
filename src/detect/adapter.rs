use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionSet};
use crate::error::{DetectionError, InitializationError};
use crate::frame::Frame;

/// Detections at or below this confidence are treated as noise.
pub const DEFAULT_REPORT_FLOOR: f32 = 0.3;

/// Upper bound on detections reported per frame.
pub const DEFAULT_MAX_DETECTIONS: usize = 20;

#[derive(Clone, Debug, PartialEq)]
enum AdapterState {
    Unloaded,
    Ready,
    Failed(String),
}

/// Contract-enforcing wrapper around a `DetectorBackend`.
///
/// The adapter guarantees that every returned `DetectionSet`:
/// - only contains finite boxes and confidences in `(floor, 1]`
/// - is sorted by descending confidence, ties in backend order
/// - holds at most `max_detections` entries
/// - is stamped with the frame size, frame sequence and backend name
pub struct DetectorAdapter {
    backend: Box<dyn DetectorBackend>,
    state: AdapterState,
    report_floor: f32,
    max_detections: usize,
}

impl DetectorAdapter {
    pub fn new(backend: Box<dyn DetectorBackend>) -> Self {
        Self {
            backend,
            state: AdapterState::Unloaded,
            report_floor: DEFAULT_REPORT_FLOOR,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }

    /// Override the noise floor applied to backend output.
    pub fn with_report_floor(mut self, floor: f32) -> Self {
        self.report_floor = floor;
        self
    }

    pub fn with_max_detections(mut self, max: usize) -> Self {
        self.max_detections = max;
        self
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn report_floor(&self) -> f32 {
        self.report_floor
    }

    pub fn is_ready(&self) -> bool {
        self.state == AdapterState::Ready
    }

    /// Load the backend. Returns immediately once loaded.
    pub fn initialize(&mut self) -> Result<(), InitializationError> {
        if self.state == AdapterState::Ready {
            return Ok(());
        }
        match self.backend.load() {
            Ok(()) => {
                log::info!("detector '{}' ready", self.backend.name());
                self.state = AdapterState::Ready;
                Ok(())
            }
            Err(err) => {
                let reason = format!("{:#}", err);
                log::error!(
                    "detector '{}' failed to load: {}",
                    self.backend.name(),
                    reason
                );
                self.state = AdapterState::Failed(reason.clone());
                Err(InitializationError::new(reason))
            }
        }
    }

    /// Run one detection pass over `frame`.
    pub fn detect(&mut self, frame: &Frame) -> Result<DetectionSet, DetectionError> {
        match &self.state {
            AdapterState::Ready => {}
            AdapterState::Unloaded => {
                return Err(DetectionError::new("detector used before initialize()"))
            }
            AdapterState::Failed(reason) => {
                return Err(DetectionError::new(format!(
                    "detector failed to initialize: {}",
                    reason
                )))
            }
        }

        frame
            .validate()
            .map_err(|err| DetectionError::new(format!("malformed frame: {:#}", err)))?;

        let raw = self
            .backend
            .detect(frame)
            .map_err(|err| DetectionError::new(format!("{:#}", err)))?;
        let raw_count = raw.len();

        let kept: Vec<Detection> = raw
            .into_iter()
            .filter(|d| self.is_reportable(d))
            .collect();
        let mut set =
            DetectionSet::from_unsorted(kept, frame.size(), frame.sequence, self.backend.name());
        set.truncate(self.max_detections);

        if !set.is_empty() {
            log::debug!(
                "frame {}: detected objects: {} ({} raw)",
                frame.sequence,
                set.summary(),
                raw_count
            );
        }
        Ok(set)
    }

    fn is_reportable(&self, detection: &Detection) -> bool {
        let c = detection.confidence;
        c.is_finite() && c <= 1.0 && c > self.report_floor && detection.bbox.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::ScriptedBackend;
    use crate::detect::result::BoundingBox;

    fn frame(sequence: u64) -> Frame {
        Frame::new(vec![0u8; 8 * 8 * 3], 8, 8, sequence)
    }

    fn det(label: &str, confidence: f32) -> Detection {
        Detection::new(label, confidence, BoundingBox::new(1.0, 1.0, 4.0, 4.0))
    }

    #[test]
    fn detect_before_initialize_fails() {
        let mut adapter = DetectorAdapter::new(Box::new(ScriptedBackend::repeating(vec![])));
        let err = adapter.detect(&frame(1)).unwrap_err();
        assert!(err.reason.contains("initialize"));
    }

    #[test]
    fn initialize_is_idempotent() {
        let backend = ScriptedBackend::repeating(vec![]);
        let probe = backend.probe();
        let mut adapter = DetectorAdapter::new(Box::new(backend));
        adapter.initialize().unwrap();
        adapter.initialize().unwrap();
        assert!(adapter.is_ready());
        assert_eq!(probe.loads(), 1);
    }

    #[test]
    fn initialize_failure_surfaces_reason() {
        let backend = ScriptedBackend::repeating(vec![]).failing_load("model asset missing");
        let mut adapter = DetectorAdapter::new(Box::new(backend));
        let err = adapter.initialize().unwrap_err();
        assert!(err.reason.contains("model asset missing"));
        assert!(adapter.detect(&frame(1)).is_err());
    }

    #[test]
    fn applies_floor_sorts_and_drops_invalid() {
        let backend = ScriptedBackend::repeating(vec![
            det("noise", 0.3),
            det("cup", 0.41),
            det("nan", f32::NAN),
            det("over", 1.2),
            det("bottle", 0.82),
            Detection::new("bad-box", 0.9, BoundingBox::new(f32::INFINITY, 0.0, 1.0, 1.0)),
        ]);
        let mut adapter = DetectorAdapter::new(Box::new(backend));
        adapter.initialize().unwrap();

        let set = adapter.detect(&frame(7)).unwrap();
        let labels: Vec<_> = set.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["bottle", "cup"]);
        assert_eq!(set.frame_sequence(), 7);
        assert_eq!(set.source(), "scripted");
        assert!(set.iter().all(|d| (0.0..=1.0).contains(&d.confidence)));
    }

    #[test]
    fn caps_detections_per_frame() {
        let many = (0..30).map(|i| det("item", 0.31 + i as f32 * 0.02)).collect();
        let mut adapter =
            DetectorAdapter::new(Box::new(ScriptedBackend::repeating(many))).with_max_detections(5);
        adapter.initialize().unwrap();

        let set = adapter.detect(&frame(1)).unwrap();
        assert_eq!(set.len(), 5);
        let best = set.best().unwrap().confidence;
        assert!((best - (0.31 + 29.0 * 0.02)).abs() < 1e-5);
    }

    #[test]
    fn malformed_frame_is_a_detection_error() {
        let backend = ScriptedBackend::repeating(vec![det("bottle", 0.9)]);
        let probe = backend.probe();
        let mut adapter = DetectorAdapter::new(Box::new(backend));
        adapter.initialize().unwrap();

        let bad = Frame::new(vec![0u8; 5], 8, 8, 1);
        let err = adapter.detect(&bad).unwrap_err();
        assert!(err.reason.contains("malformed frame"));
        assert_eq!(probe.detect_calls(), 0);
    }
}
