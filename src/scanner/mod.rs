//! Live product scanner.
//!
//! `Scanner` owns the detector adapter, the camera lease, the overlay renderer
//! and the capture policy, and drives them through the lifecycle in
//! `ScannerState`. It is single-threaded: `tick` runs one detection cycle to
//! completion, and `ScannerRunner` schedules ticks at frame cadence.
//!
//! The current `DetectionSet` is held behind an `Arc` and replaced wholesale
//! each cycle, so the overlay and a capture decision always read the same set.

mod runner;
mod state;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::capture::{CameraLease, CaptureConstraints, CaptureSource, LeaseStats};
use crate::detect::{DetectionSet, DetectorAdapter};
use crate::error::{CaptureError, CaptureRejection, ScannerError};
use crate::frame::{Frame, FrameSize};
use crate::overlay::{DrawCommand, OverlayRenderer, OverlayStyle};
use crate::policy::{CapturePolicy, CaptureResult, DEFAULT_CAPTURE_THRESHOLD};

pub use runner::{ScannerBoard, ScannerHandle, ScannerRunner};
pub use state::ScannerState;

/// User-visible status lines.
pub mod status {
    pub const IDLE: &str = "Ready to scan";
    pub const INITIALIZING_MODEL: &str = "Loading detection model…";
    pub const INITIALIZING_CAMERA: &str = "Starting camera…";
    pub const SCANNING: &str = "Scanning… position object in frame";
    pub const NO_DETECTIONS: &str = "No product detected, position object in frame";
    pub const LOW_CONFIDENCE: &str = "Detection confidence too low";
    pub const DETECTION_RETRY: &str = "Detection failed, retrying…";
    pub const FRAME_RETRY: &str = "Waiting for camera frame…";
    pub const STOPPED: &str = "Scanner stopped";
}

/// A device that fails this many grabs in a row is treated as lost.
const MAX_CONSECUTIVE_GRAB_FAILURES: u32 = 30;

/// Runtime settings for one scanner.
#[derive(Clone, Debug, PartialEq)]
pub struct ScannerSettings {
    pub constraints: CaptureConstraints,
    pub capture_threshold: f32,
    pub overlay: OverlayStyle,
    /// Cycles slower than this are logged.
    pub slow_cycle_warn: Duration,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            constraints: CaptureConstraints::default(),
            capture_threshold: DEFAULT_CAPTURE_THRESHOLD,
            overlay: OverlayStyle::default(),
            slow_cycle_warn: Duration::from_millis(250),
        }
    }
}

/// What one `tick` did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Preconditions not met (not started, or between states); nothing ran.
    Skipped,
    /// Camera acquired but no live frame yet.
    WaitingForCamera,
    /// First live frame arrived; the scanner is now `Scanning`.
    CameraReady,
    /// A detection cycle completed with this many detections.
    Detected(usize),
    /// The cycle failed transiently and will be retried.
    Retry,
    /// The scanner is `Stopped` or `Error`; no further ticks will run.
    Halted,
}

/// Per-scanner counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub cycles: u64,
    pub detection_errors: u64,
    pub frame_errors: u64,
    pub overlay_errors: u64,
    pub rejected_captures: u64,
    pub slow_cycles: u64,
}

pub struct Scanner {
    detector: DetectorAdapter,
    camera: CameraLease,
    policy: CapturePolicy,
    overlay: OverlayRenderer,
    settings: ScannerSettings,
    state: ScannerState,
    status: String,
    current: Arc<DetectionSet>,
    current_frame: Option<Frame>,
    overlay_commands: Arc<Vec<DrawCommand>>,
    grab_failures: u32,
    stats: ScanStats,
}

impl Scanner {
    pub fn new(
        detector: DetectorAdapter,
        camera: Box<dyn CaptureSource>,
        settings: ScannerSettings,
    ) -> Self {
        Self {
            detector,
            camera: CameraLease::new(camera),
            policy: CapturePolicy::new(settings.capture_threshold),
            overlay: OverlayRenderer::new(settings.overlay),
            settings,
            state: ScannerState::Uninitialized,
            status: status::IDLE.to_string(),
            current: Arc::new(DetectionSet::default()),
            current_frame: None,
            overlay_commands: Arc::new(Vec::new()),
            grab_failures: 0,
            stats: ScanStats::default(),
        }
    }

    /// Replace the overlay renderer (e.g. to plug in real font metrics).
    pub fn with_overlay(mut self, overlay: OverlayRenderer) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn state(&self) -> &ScannerState {
        &self.state
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn current_detections(&self) -> Arc<DetectionSet> {
        Arc::clone(&self.current)
    }

    /// Draw commands for the most recent cycle.
    pub fn overlay_commands(&self) -> Arc<Vec<DrawCommand>> {
        Arc::clone(&self.overlay_commands)
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn camera_stats(&self) -> LeaseStats {
        self.camera.stats()
    }

    pub fn settings(&self) -> &ScannerSettings {
        &self.settings
    }

    /// Load the model, then acquire the camera.
    ///
    /// On success the scanner is in `InitializingCamera`; the first tick that
    /// sees a live frame moves it to `Scanning`. Failures are terminal.
    pub fn start(&mut self) -> Result<(), ScannerError> {
        if self.state != ScannerState::Uninitialized {
            return Err(ScannerError::InvalidTransition {
                action: "start",
                state: self.state.clone(),
            });
        }

        self.transition(ScannerState::InitializingModel, status::INITIALIZING_MODEL);
        if let Err(err) = self.detector.initialize() {
            self.fail(err.to_string());
            return Err(err.into());
        }

        self.transition(ScannerState::InitializingCamera, status::INITIALIZING_CAMERA);
        if let Err(err) = self.camera.acquire(&self.settings.constraints) {
            self.fail(err.to_string());
            return Err(err.into());
        }
        Ok(())
    }

    /// Run one cooperative cycle.
    pub fn tick(&mut self) -> TickOutcome {
        match self.state {
            ScannerState::InitializingCamera => self.poll_camera(),
            ScannerState::Scanning => self.scan_cycle(),
            ScannerState::Stopped | ScannerState::Error(_) => TickOutcome::Halted,
            _ => TickOutcome::Skipped,
        }
    }

    fn poll_camera(&mut self) -> TickOutcome {
        match self.camera.grab() {
            Ok(Some(frame)) => {
                log::info!(
                    "camera {} live ({}x{})",
                    self.camera.name(),
                    frame.width,
                    frame.height
                );
                self.grab_failures = 0;
                self.transition(ScannerState::Scanning, status::SCANNING);
                TickOutcome::CameraReady
            }
            Ok(None) => TickOutcome::WaitingForCamera,
            Err(err) => self.grab_failed(err),
        }
    }

    fn scan_cycle(&mut self) -> TickOutcome {
        if !self.detector.is_ready() {
            return TickOutcome::Skipped;
        }
        let started = Instant::now();

        let frame = match self.camera.grab() {
            Ok(Some(frame)) => frame,
            Ok(None) => return TickOutcome::Skipped,
            Err(err) => return self.grab_failed(err),
        };
        self.grab_failures = 0;
        self.stats.cycles += 1;

        let outcome = match self.detector.detect(&frame) {
            Ok(set) => {
                let count = set.len();
                self.status = match set.best() {
                    Some(best) => format!("Detected {} ({}%)", best.label, best.percent()),
                    None => status::SCANNING.to_string(),
                };
                self.current = Arc::new(set);
                TickOutcome::Detected(count)
            }
            Err(err) => {
                self.stats.detection_errors += 1;
                log::warn!("frame {}: {}", frame.sequence, err);
                self.status = status::DETECTION_RETRY.to_string();
                self.current = Arc::new(DetectionSet::empty(frame.size(), frame.sequence));
                TickOutcome::Retry
            }
        };
        self.redraw(frame.size());
        self.current_frame = Some(frame);

        let elapsed = started.elapsed();
        if elapsed > self.settings.slow_cycle_warn {
            self.stats.slow_cycles += 1;
            log::warn!(
                "detection cycle took {}ms (budget {}ms)",
                elapsed.as_millis(),
                self.settings.slow_cycle_warn.as_millis()
            );
        }
        outcome
    }

    fn redraw(&mut self, size: FrameSize) {
        match self.overlay.render(size, &self.current) {
            Ok(commands) => self.overlay_commands = Arc::new(commands),
            Err(err) => {
                self.stats.overlay_errors += 1;
                log::warn!("overlay skipped: {}", err);
                self.overlay_commands = Arc::new(vec![DrawCommand::Clear {
                    width: size.width,
                    height: size.height,
                }]);
            }
        }
    }

    fn grab_failed(&mut self, err: anyhow::Error) -> TickOutcome {
        self.stats.frame_errors += 1;
        self.grab_failures += 1;
        log::warn!("camera {}: frame grab failed: {:#}", self.camera.name(), err);
        if self.grab_failures >= MAX_CONSECUTIVE_GRAB_FAILURES {
            self.fail(format!(
                "camera {} stopped delivering frames: {:#}",
                self.camera.name(),
                err
            ));
            return TickOutcome::Halted;
        }
        self.status = status::FRAME_RETRY.to_string();
        TickOutcome::Retry
    }

    /// Apply the capture policy to the current detection set.
    ///
    /// Rejections leave the scanner `Scanning`. An accepted capture releases
    /// the camera and stops the scanner.
    pub fn request_capture(&mut self) -> Result<CaptureResult, CaptureError> {
        if self.state != ScannerState::Scanning {
            return Err(CaptureError::NotScanning(self.state.clone()));
        }
        self.transition(ScannerState::Capturing, self.status.clone());

        let decision = match &self.current_frame {
            Some(frame) => self.policy.decide(&self.current, frame),
            None => Err(CaptureRejection::NoDetections),
        };

        match decision {
            Ok(result) => {
                log::info!(
                    "capture accepted: {} ({}%), {} supporting detections",
                    result.primary_label,
                    (result.confidence * 100.0).round() as u32,
                    result.all_detections.len()
                );
                let line = format!(
                    "Captured {} ({}%)",
                    result.primary_label,
                    (result.confidence * 100.0).round() as u32
                );
                self.shutdown(ScannerState::Stopped, line);
                Ok(result)
            }
            Err(rejection) => {
                self.stats.rejected_captures += 1;
                log::info!("capture rejected: {}", rejection);
                let line = match rejection {
                    CaptureRejection::NoDetections => status::NO_DETECTIONS,
                    CaptureRejection::LowConfidence { .. } => status::LOW_CONFIDENCE,
                };
                self.transition(ScannerState::Scanning, line);
                Err(rejection.into())
            }
        }
    }

    /// Stop scanning and release the camera. Safe to call repeatedly and in
    /// any state; `Error` stays `Error`.
    pub fn stop(&mut self) {
        if self.state.is_terminal() {
            self.camera.release();
            return;
        }
        self.shutdown(ScannerState::Stopped, status::STOPPED.to_string());
    }

    fn shutdown(&mut self, next: ScannerState, line: String) {
        self.camera.release();
        self.current = Arc::new(DetectionSet::default());
        self.current_frame = None;
        self.overlay_commands = Arc::new(Vec::new());
        self.transition(next, line);
    }

    fn fail(&mut self, reason: String) {
        log::error!("scanner failed: {}", reason);
        let line = format!("Error: {}", reason);
        self.shutdown(ScannerState::Error(reason), line);
    }

    fn transition(&mut self, next: ScannerState, line: impl Into<String>) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        if self.state != next {
            log::info!("scanner: {} -> {}", self.state, next);
        }
        self.state = next;
        self.status = line.into();
    }
}
