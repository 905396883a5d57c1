//! Camera frames.
//!
//! - `Frame`: one still image sampled from the live stream, packed RGB24.
//! - `FrameSize`: pixel dimensions shared by frames, detection sets and overlays.
//!
//! Frames are produced by a `CaptureSource`, borrowed by the detector for one
//! cycle, and only retained past that cycle as the snapshot of an accepted
//! capture.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use serde::Serialize;
use std::time::SystemTime;

/// Bytes per packed RGB24 pixel.
pub const RGB_CHANNELS: usize = 3;

/// Default JPEG quality for capture snapshots.
pub const SNAPSHOT_JPEG_QUALITY: u8 = 90;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn shorter_side(&self) -> u32 {
        self.width.min(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Expected RGB24 buffer length, or `None` on overflow.
    pub fn rgb_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(RGB_CHANNELS))
    }
}

/// One frame of packed RGB24 pixels.
///
/// The constructor does not validate the buffer; the detector adapter rejects
/// malformed frames with a `DetectionError` so a bad frame costs one cycle.
#[derive(Clone)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic per-source frame counter.
    pub sequence: u64,
    captured_at: SystemTime,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            sequence,
            captured_at: SystemTime::now(),
        }
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    /// Check that the pixel buffer matches the declared dimensions.
    pub fn validate(&self) -> Result<()> {
        let size = self.size();
        if size.is_empty() {
            return Err(anyhow!(
                "frame has zero area ({}x{})",
                self.width,
                self.height
            ));
        }
        let expected = size
            .rgb_len()
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if self.data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                self.width,
                self.height,
                self.data.len()
            ));
        }
        Ok(())
    }

    /// Copy into an `image` buffer for resizing or painting.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        self.validate()?;
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame buffer does not fit {}x{}", self.width, self.height))
    }

    /// Encode the frame as a JPEG snapshot.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        self.validate()?;
        encode_rgb_jpeg(&self.data, self.width, self.height, quality)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixels omitted.
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Encode packed RGB24 pixels as JPEG.
pub fn encode_rgb_jpeg(pixels: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .write_image(pixels, width, height, ExtendedColorType::Rgb8)
        .context("failed to encode JPEG snapshot")?;
    Ok(out)
}
