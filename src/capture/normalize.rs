//! Conversion of device pixel formats to packed RGB24.

use anyhow::{anyhow, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Nv12,
    /// Packed 4:2:2, the default for most UVC webcams.
    Yuyv,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"NV12" => Some(PixelFormat::Nv12),
            b"YUYV" => Some(PixelFormat::Yuyv),
            _ => None,
        }
    }

    fn expected_len(self, width: u32, height: u32) -> Option<usize> {
        let area = (width as usize).checked_mul(height as usize)?;
        match self {
            PixelFormat::Rgb24 => area.checked_mul(3),
            PixelFormat::Nv12 => area.checked_add(area / 2),
            PixelFormat::Yuyv => area.checked_mul(2),
        }
    }
}

pub(crate) fn to_rgb24(pixels: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<Vec<u8>> {
    let expected = format
        .expected_len(width, height)
        .ok_or_else(|| anyhow!("{:?} frame dimensions overflow", format))?;
    if pixels.len() < expected {
        return Err(anyhow!(
            "{:?} frame too short: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }
    // Drivers may pad the buffer past the image payload.
    let pixels = &pixels[..expected];
    let w = width as usize;
    let h = height as usize;

    let rgb = match format {
        PixelFormat::Rgb24 => pixels.to_vec(),
        PixelFormat::Nv12 => {
            let y_plane = w * h;
            let mut rgb = vec![0u8; y_plane * 3];
            for j in 0..h {
                for i in 0..w {
                    let uv = y_plane + (j / 2) * w + (i / 2) * 2;
                    let px = yuv_to_rgb(pixels[j * w + i], pixels[uv], pixels[uv + 1]);
                    rgb[(j * w + i) * 3..(j * w + i) * 3 + 3].copy_from_slice(&px);
                }
            }
            rgb
        }
        PixelFormat::Yuyv => {
            let mut rgb = Vec::with_capacity(w * h * 3);
            for quad in pixels.chunks_exact(4) {
                let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
                rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
                rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
            }
            rgb
        }
    };
    Ok(rgb)
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    [
        clamp_to_u8(y + 1.402 * v),
        clamp_to_u8(y - 0.344_136 * u - 0.714_136 * v),
        clamp_to_u8(y + 1.772 * u),
    ]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
