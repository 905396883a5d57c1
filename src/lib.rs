//! Live product scanner
//!
//! Streams camera frames through an object detector, draws the detections
//! over the live preview and finalizes a capture once the best detection is
//! confident enough.
//!
//! # Module Structure
//!
//! - `frame`: Captured RGB frames and JPEG encoding
//! - `capture`: Camera sources and the `CameraLease` that guarantees release
//! - `detect`: Detector backends and the `DetectorAdapter` output contract
//! - `overlay`: Pure draw-command generation plus a raster painter
//! - `policy`: Capture threshold decision
//! - `scanner`: Lifecycle state machine and the threaded runner
//! - `product`: Serializable product context built from a capture
//! - `config`: File and environment configuration

pub mod capture;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod overlay;
pub mod policy;
pub mod product;
pub mod scanner;
pub mod ui;

pub use capture::{open_camera, CameraLease, CaptureConstraints, CaptureSource, SyntheticCamera};
pub use config::{CameraSettings, DetectorSettings, ScannerConfig};
pub use detect::{
    build_adapter, build_backend, BoundingBox, Detection, DetectionSet, DetectorAdapter,
    DetectorBackend, ScriptedBackend,
};
pub use error::{
    CameraAccessError, CaptureError, CaptureRejection, DetectionError, InitializationError,
    OverlayError, ScannerError,
};
pub use frame::{Frame, FrameSize};
pub use overlay::{DrawCommand, OverlayRenderer, OverlayStyle};
pub use policy::{CapturePolicy, CaptureResult, DEFAULT_CAPTURE_THRESHOLD};
pub use product::ProductContext;
pub use scanner::{
    Scanner, ScannerBoard, ScannerHandle, ScannerRunner, ScannerSettings, ScannerState,
    TickOutcome,
};
