//! Scanner overlay.
//!
//! `OverlayRenderer::render` is a pure function of the frame size and the
//! current `DetectionSet`. Every call starts with `DrawCommand::Clear`, so a
//! consumer replaying the commands never keeps boxes from a previous frame.

mod raster;

use serde::Serialize;

use crate::detect::{Detection, DetectionSet};
use crate::error::OverlayError;
use crate::frame::FrameSize;

pub use raster::paint;

/// Fraction of the shorter frame side left as margin around the guide region.
pub const DEFAULT_GUIDE_MARGIN: f32 = 0.10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Color(pub u8, pub u8, pub u8);

impl Color {
    pub const GUIDE: Color = Color(255, 255, 255);
    pub const BOX: Color = Color(0, 255, 0);
    pub const PLATE: Color = Color(0, 255, 0);
    pub const TEXT: Color = Color(0, 0, 0);
}

/// One drawing instruction, in frame pixel coordinates.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    /// Clear the whole overlay surface.
    Clear { width: u32, height: u32 },
    StrokeRect {
        rect: Rect,
        color: Color,
        line_width: f32,
        dashed: bool,
    },
    FillRect { rect: Rect, color: Color },
    /// `y` is the top of the text line.
    Text {
        text: String,
        x: f32,
        y: f32,
        font_px: f32,
        color: Color,
    },
}

/// Measures rendered text width.
pub trait TextMeasure: Send {
    fn text_width(&self, text: &str, font_px: f32) -> f32;
}

/// Fixed-advance approximation of a sans-serif font.
#[derive(Clone, Copy, Debug)]
pub struct MonospaceMetrics {
    /// Glyph advance as a fraction of the font size.
    pub advance: f32,
}

impl Default for MonospaceMetrics {
    fn default() -> Self {
        Self { advance: 0.6 }
    }
}

impl TextMeasure for MonospaceMetrics {
    fn text_width(&self, text: &str, font_px: f32) -> f32 {
        text.chars().count() as f32 * font_px * self.advance
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayStyle {
    pub guide_margin: f32,
    pub font_px: f32,
    pub line_width: f32,
    pub label_padding: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            guide_margin: DEFAULT_GUIDE_MARGIN,
            font_px: 16.0,
            line_width: 2.0,
            label_padding: 4.0,
        }
    }
}

pub struct OverlayRenderer {
    style: OverlayStyle,
    metrics: Box<dyn TextMeasure>,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle) -> Self {
        Self {
            style,
            metrics: Box::new(MonospaceMetrics::default()),
        }
    }

    pub fn with_metrics(mut self, metrics: Box<dyn TextMeasure>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Guide region: the frame inset by `guide_margin * shorter side`.
    pub fn guide_region(&self, size: FrameSize) -> Rect {
        let margin = self.style.guide_margin * size.shorter_side() as f32;
        Rect::new(
            margin,
            margin,
            (size.width as f32 - 2.0 * margin).max(0.0),
            (size.height as f32 - 2.0 * margin).max(0.0),
        )
    }

    /// Produce the full command list for one frame.
    ///
    /// The guide region is always drawn. Detections with a confidence outside
    /// `[0, 1]` or a non-finite box are skipped.
    pub fn render(
        &self,
        size: FrameSize,
        detections: &DetectionSet,
    ) -> Result<Vec<DrawCommand>, OverlayError> {
        if size.is_empty() {
            return Err(OverlayError::EmptyFrame {
                width: size.width,
                height: size.height,
            });
        }
        let set_size = detections.frame_size();
        if !detections.is_empty() && set_size != size {
            return Err(OverlayError::DimensionMismatch {
                width: size.width,
                height: size.height,
                set_width: set_size.width,
                set_height: set_size.height,
            });
        }

        let mut commands = Vec::with_capacity(2 + detections.len() * 3);
        commands.push(DrawCommand::Clear {
            width: size.width,
            height: size.height,
        });
        commands.push(DrawCommand::StrokeRect {
            rect: self.guide_region(size),
            color: Color::GUIDE,
            line_width: self.style.line_width,
            dashed: true,
        });

        for detection in detections {
            if !(0.0..=1.0).contains(&detection.confidence) || !detection.bbox.is_finite() {
                log::warn!(
                    "overlay: skipping invalid detection {} ({})",
                    detection.label,
                    detection.confidence
                );
                continue;
            }
            self.push_detection(&mut commands, detection);
        }
        Ok(commands)
    }

    fn push_detection(&self, commands: &mut Vec<DrawCommand>, detection: &Detection) {
        let b = detection.bbox;
        let pad = self.style.label_padding;
        let text = format!("{} {}%", detection.label, detection.percent());
        let plate_width = self.metrics.text_width(&text, self.style.font_px) + 2.0 * pad;
        let plate_height = self.style.font_px + 2.0 * pad;

        // Above the box, or just inside its top edge when that would leave the frame.
        let plate_y = if b.y - plate_height >= 0.0 {
            b.y - plate_height
        } else {
            b.y.max(0.0)
        };

        commands.push(DrawCommand::StrokeRect {
            rect: Rect::new(b.x, b.y, b.width, b.height),
            color: Color::BOX,
            line_width: self.style.line_width,
            dashed: false,
        });
        commands.push(DrawCommand::FillRect {
            rect: Rect::new(b.x, plate_y, plate_width, plate_height),
            color: Color::PLATE,
        });
        commands.push(DrawCommand::Text {
            text,
            x: b.x + pad,
            y: plate_y + pad,
            font_px: self.style.font_px,
            color: Color::TEXT,
        });
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(OverlayStyle::default())
    }
}
