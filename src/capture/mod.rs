//! Camera capture sources.
//!
//! This module provides the sources the scanner pulls frames from:
//! - Synthetic camera (`stub://` URLs, tests and demos)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! A capture source is a single exclusively-owned device. The scanner never
//! holds one directly; it goes through `CameraLease`, which makes release
//! idempotent and guarantees it on drop.
//!
//! Capture sources MUST NOT:
//! - Store frames to disk
//! - Retain frames beyond handoff to the scanner

mod lease;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::config::CameraSettings;
use crate::error::CameraAccessError;
use crate::frame::Frame;

pub use lease::{CameraLease, LeaseStats};
pub use synthetic::{CameraProbe, SyntheticCamera};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Camera;

/// Requested stream properties. Sources may deliver a different resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

/// A live camera stream.
pub trait CaptureSource: Send {
    /// Human-readable source identifier (URL or device path).
    fn name(&self) -> &str;

    /// Open the device and start streaming.
    fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<(), CameraAccessError>;

    /// Pull the current frame. `Ok(None)` means no live frame is ready yet.
    fn grab(&mut self) -> Result<Option<Frame>>;

    /// Stop streaming and close the device. Must tolerate repeated calls.
    fn release(&mut self);
}

/// Open the source named by `settings.url`.
///
/// `stub://` URLs yield a `SyntheticCamera`; device paths need `ingest-v4l2`.
pub fn open_camera(settings: &CameraSettings) -> Result<Box<dyn CaptureSource>> {
    if settings.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::new(&settings.url)));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Camera::new(&settings.url)))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        anyhow::bail!(
            "camera {} requires the ingest-v4l2 feature",
            settings.url
        )
    }
}
