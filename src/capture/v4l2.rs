//! V4L2 camera source.
//!
//! Opens a local device node (e.g. `/dev/video0`), negotiates the requested
//! resolution, and memory-maps a small ring of capture buffers. Frames are
//! converted to RGB24 before handoff.

use anyhow::{Context, Result};
use ouroboros::self_referencing;

use super::normalize::{to_rgb24, PixelFormat};
use super::{CaptureConstraints, CaptureSource};
use crate::error::CameraAccessError;
use crate::frame::Frame;

const STREAM_BUFFERS: u32 = 4;

#[self_referencing]
struct DeviceStream {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

struct ActiveStream {
    stream: DeviceStream,
    width: u32,
    height: u32,
    format: PixelFormat,
}

pub struct V4l2Camera {
    device_path: String,
    active: Option<ActiveStream>,
    frame_count: u64,
}

impl V4l2Camera {
    pub fn new(device_path: &str) -> Self {
        Self {
            device_path: device_path.to_string(),
            active: None,
            frame_count: 0,
        }
    }

    fn open(&self, constraints: &CaptureConstraints) -> Result<ActiveStream> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.device_path)
            .with_context(|| format!("open v4l2 device {}", self.device_path))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = constraints.width;
        format.height = constraints.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Camera: failed to set RGB3 on {}: {}",
                    self.device_path,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).with_context(|| {
            format!(
                "unsupported pixel format {} on {}",
                format.fourcc, self.device_path
            )
        })?;

        if constraints.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(constraints.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Camera: failed to set fps on {}: {}",
                    self.device_path,
                    err
                );
            }
        }

        let stream = DeviceStreamBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        Ok(ActiveStream {
            stream,
            width: format.width,
            height: format.height,
            format: pixel_format,
        })
    }
}

impl CaptureSource for V4l2Camera {
    fn name(&self) -> &str {
        &self.device_path
    }

    fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<(), CameraAccessError> {
        let active = self
            .open(constraints)
            .map_err(|err| CameraAccessError::new(format!("{:#}", err)))?;
        log::info!(
            "V4l2Camera: streaming {} ({}x{} {:?})",
            self.device_path,
            active.width,
            active.height,
            active.format
        );
        self.active = Some(active);
        Ok(())
    }

    fn grab(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let Some(active) = self.active.as_mut() else {
            return Ok(None);
        };
        let (width, height, format) = (active.width, active.height, active.format);
        let rgb = active.stream.with_mut(|fields| -> Result<Vec<u8>> {
            let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
            to_rgb24(buf, width, height, format)
        })?;

        self.frame_count += 1;
        Ok(Some(Frame::new(rgb, width, height, self.frame_count)))
    }

    fn release(&mut self) {
        if self.active.take().is_some() {
            log::info!("V4l2Camera: closed {}", self.device_path);
        }
    }
}
