use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// One scripted detection outcome.
#[derive(Clone, Debug)]
enum Step {
    Detections(Vec<Detection>),
    Failure(String),
}

/// Shared counters for observing a backend after it has been boxed.
#[derive(Clone, Debug, Default)]
pub struct BackendProbe {
    loads: Arc<AtomicUsize>,
    detect_calls: Arc<AtomicUsize>,
}

impl BackendProbe {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }
}

/// Stub backend that replays a script of per-frame results.
///
/// Each `detect` call consumes the next step; the final step repeats forever.
/// Used by tests and by the `stub` backend selection for demo runs.
pub struct ScriptedBackend {
    steps: VecDeque<Step>,
    last: Step,
    load_failure: Option<String>,
    probe: BackendProbe,
}

impl ScriptedBackend {
    /// A backend that returns the same detections for every frame.
    pub fn repeating(detections: Vec<Detection>) -> Self {
        Self {
            steps: VecDeque::new(),
            last: Step::Detections(detections),
            load_failure: None,
            probe: BackendProbe::default(),
        }
    }

    /// A backend with an empty script (no detections).
    pub fn empty() -> Self {
        Self::repeating(Vec::new())
    }

    /// Demo script: an empty scene, a weak unrelated detection, then a
    /// product that settles at high confidence.
    pub fn demo(frame_width: u32, frame_height: u32) -> Self {
        let w = frame_width as f32;
        let h = frame_height as f32;
        let product = BoundingBox::new(w * 0.35, h * 0.2, w * 0.3, h * 0.6);
        let side = BoundingBox::new(w * 0.05, h * 0.6, w * 0.2, h * 0.3);
        let mut backend = Self::repeating(vec![
            Detection::new("bottle", 0.82, product),
            Detection::new("cup", 0.41, side),
        ]);
        for _ in 0..10 {
            backend = backend.then(Vec::new());
        }
        for _ in 0..10 {
            backend = backend.then(vec![Detection::new("box", 0.35, side)]);
        }
        backend.then(vec![Detection::new("bottle", 0.56, product)])
    }

    /// Queue detections for the next frame, ahead of the repeating tail.
    pub fn then(mut self, detections: Vec<Detection>) -> Self {
        self.steps.push_back(Step::Detections(detections));
        self
    }

    /// Queue a failed detection cycle.
    pub fn then_fail(mut self, reason: impl Into<String>) -> Self {
        self.steps.push_back(Step::Failure(reason.into()));
        self
    }

    /// Make `load` fail, simulating an asset load failure.
    pub fn failing_load(mut self, reason: impl Into<String>) -> Self {
        self.load_failure = Some(reason.into());
        self
    }

    pub fn probe(&self) -> BackendProbe {
        self.probe.clone()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn load(&mut self) -> Result<()> {
        self.probe.loads.fetch_add(1, Ordering::SeqCst);
        match &self.load_failure {
            Some(reason) => Err(anyhow!("{}", reason)),
            None => Ok(()),
        }
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.probe.detect_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.pop_front().unwrap_or_else(|| self.last.clone());
        match step {
            Step::Detections(detections) => Ok(detections),
            Step::Failure(reason) => Err(anyhow!("{}", reason)),
        }
    }
}
