//! Error taxonomy for the scanner pipeline.
//!
//! Terminal errors (`InitializationError`, `CameraAccessError`) move the
//! scanner into `Error`. `DetectionError` is per-cycle and transient.
//! `CaptureRejection` never changes scanner state.

use thiserror::Error;

use crate::scanner::ScannerState;

/// The detector capability could not be made ready.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("detector initialization failed: {reason}")]
pub struct InitializationError {
    pub reason: String,
}

impl InitializationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A single detection cycle failed. The loop retries on the next frame.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("detection failed: {reason}")]
pub struct DetectionError {
    pub reason: String,
}

impl DetectionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Camera permission or device failure.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("camera access failed: {reason}")]
pub struct CameraAccessError {
    pub reason: String,
}

impl CameraAccessError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Why the capture policy refused a detection set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureRejection {
    #[error("no detections in frame")]
    NoDetections,
    #[error("detection confidence too low ({confidence:.2} < {threshold:.2})")]
    LowConfidence { confidence: f32, threshold: f32 },
}

/// Failure of an explicit capture request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Rejected(#[from] CaptureRejection),
    #[error("capture requested while scanner is {0}")]
    NotScanning(ScannerState),
    #[error("scanner is no longer running")]
    RunnerGone,
}

impl CaptureError {
    /// True when scanning continues after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CaptureError::Rejected(_))
    }
}

/// The overlay for one frame could not be produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OverlayError {
    #[error("frame has zero area ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error(
        "detections were computed on a {set_width}x{set_height} frame, overlay target is {width}x{height}"
    )]
    DimensionMismatch {
        width: u32,
        height: u32,
        set_width: u32,
        set_height: u32,
    },
}

/// Errors surfaced by scanner lifecycle calls.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScannerError {
    #[error(transparent)]
    Initialization(#[from] InitializationError),
    #[error(transparent)]
    CameraAccess(#[from] CameraAccessError),
    #[error("cannot {action} while scanner is {state}")]
    InvalidTransition {
        action: &'static str,
        state: ScannerState,
    },
}
