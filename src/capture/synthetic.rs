//! Synthetic camera (`stub://` URLs).
//!
//! Produces deterministic patterned RGB frames with light sensor noise. Used by
//! tests and demo runs where no camera is attached.
//!
//! Special URLs:
//! - `stub://denied` fails `acquire` like a refused camera permission.

use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{CaptureConstraints, CaptureSource};
use crate::error::CameraAccessError;
use crate::frame::Frame;

/// Frames dropped after acquire before the stream counts as live.
const DEFAULT_WARMUP_FRAMES: u32 = 2;

/// Shared counters for observing a camera after it has been boxed.
#[derive(Clone, Debug, Default)]
pub struct CameraProbe {
    acquisitions: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl CameraProbe {
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Number of releases that actually closed an open stream.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

pub struct SyntheticCamera {
    url: String,
    width: u32,
    height: u32,
    streaming: bool,
    warmup_frames: u32,
    warmup_remaining: u32,
    denied: Option<String>,
    frame_count: u64,
    /// Simulated scene state; shifts the pattern every 50 frames.
    scene_state: u8,
    probe: CameraProbe,
}

impl SyntheticCamera {
    pub fn new(url: &str) -> Self {
        let denied = (url == "stub://denied").then(|| "permission denied by user".to_string());
        Self {
            url: url.to_string(),
            width: 0,
            height: 0,
            streaming: false,
            warmup_frames: DEFAULT_WARMUP_FRAMES,
            warmup_remaining: 0,
            denied,
            frame_count: 0,
            scene_state: 0,
            probe: CameraProbe::default(),
        }
    }

    /// Number of `grab` calls that return no frame after each acquire.
    pub fn with_warmup(mut self, frames: u32) -> Self {
        self.warmup_frames = frames;
        self
    }

    /// Fail `acquire` with `reason`.
    pub fn deny_access(mut self, reason: impl Into<String>) -> Self {
        self.denied = Some(reason.into());
        self
    }

    pub fn probe(&self) -> CameraProbe {
        self.probe.clone()
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.width as usize) * (self.height as usize) * 3;

        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        for pixel in pixels.iter_mut().step_by(97) {
            *pixel = pixel.wrapping_add(rand::random::<u8>() % 4);
        }
        pixels
    }
}

impl CaptureSource for SyntheticCamera {
    fn name(&self) -> &str {
        &self.url
    }

    fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<(), CameraAccessError> {
        if let Some(reason) = &self.denied {
            return Err(CameraAccessError::new(format!("{}: {}", self.url, reason)));
        }
        if constraints.width == 0 || constraints.height == 0 {
            return Err(CameraAccessError::new(format!(
                "{}: unsupported resolution {}x{}",
                self.url, constraints.width, constraints.height
            )));
        }
        self.width = constraints.width;
        self.height = constraints.height;
        self.streaming = true;
        self.warmup_remaining = self.warmup_frames;
        self.probe.acquisitions.fetch_add(1, Ordering::SeqCst);
        log::info!(
            "SyntheticCamera: streaming {} ({}x{})",
            self.url,
            self.width,
            self.height
        );
        Ok(())
    }

    fn grab(&mut self) -> Result<Option<Frame>> {
        if !self.streaming {
            return Ok(None);
        }
        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            return Ok(None);
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Ok(Some(Frame::new(
            pixels,
            self.width,
            self.height,
            self.frame_count,
        )))
    }

    fn release(&mut self) {
        if !self.streaming {
            return;
        }
        self.streaming = false;
        self.probe.releases.fetch_add(1, Ordering::SeqCst);
    }
}
