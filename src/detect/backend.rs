use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend is the external object-recognition capability treated as a
/// black box: given a frame, return candidate detections with confidences and
/// pixel-space boxes. Backends do not filter or sort; the `DetectorAdapter`
/// enforces the output contract on top of whatever a backend returns.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Load model assets and prepare for inference.
    ///
    /// Called by the adapter at most once per successful initialization.
    fn load(&mut self) -> Result<()>;

    /// Run detection on a validated frame.
    ///
    /// Implementations must treat the frame as read-only and must not keep it
    /// past the call.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}
