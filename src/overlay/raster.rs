use image::{Rgb, RgbImage};

use super::{Color, DrawCommand, Rect};

const DASH_ON: u32 = 8;
const DASH_OFF: u32 = 6;

/// Burn overlay commands into an image.
///
/// `Clear` is a no-op here because the target is the camera frame itself, not
/// a transparent layer. `Text` is not rasterised (no font is bundled); its
/// plate still shows where the label sits.
pub fn paint(img: &mut RgbImage, commands: &[DrawCommand]) {
    for command in commands {
        match command {
            DrawCommand::Clear { .. } | DrawCommand::Text { .. } => {}
            DrawCommand::StrokeRect {
                rect,
                color,
                line_width,
                dashed,
            } => stroke_rect(img, rect, *color, line_width.round().max(1.0) as u32, *dashed),
            DrawCommand::FillRect { rect, color } => fill_rect(img, rect, *color),
        }
    }
}

/// Clamp a rect to the image, returning inclusive pixel bounds.
///
/// `None` when the rect does not overlap the image at all.
fn pixel_bounds(img: &RgbImage, rect: &Rect) -> Option<(u32, u32, u32, u32)> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    if rect.x + rect.width < 0.0
        || rect.y + rect.height < 0.0
        || rect.x >= w as f32
        || rect.y >= h as f32
    {
        return None;
    }
    let clamp = |v: f32, max: u32| -> u32 { v.max(0.0).min((max - 1) as f32) as u32 };
    let x0 = clamp(rect.x, w);
    let y0 = clamp(rect.y, h);
    let x1 = clamp(rect.x + rect.width, w);
    let y1 = clamp(rect.y + rect.height, h);
    if x1 < x0 || y1 < y0 {
        return None;
    }
    Some((x0, y0, x1, y1))
}

fn stroke_rect(img: &mut RgbImage, rect: &Rect, color: Color, thickness: u32, dashed: bool) {
    let Some((x0, y0, x1, y1)) = pixel_bounds(img, rect) else {
        return;
    };
    // Past half the shorter side every pass redraws the same pixels.
    let thickness = thickness.min((x1 - x0).min(y1 - y0) / 2 + 1);
    let px = Rgb([color.0, color.1, color.2]);
    let on = |i: u32| !dashed || i % (DASH_ON + DASH_OFF) < DASH_ON;
    for t in 0..thickness {
        let (top, bottom) = (y0.saturating_add(t).min(y1), y1.saturating_sub(t).max(y0));
        let (left, right) = (x0.saturating_add(t).min(x1), x1.saturating_sub(t).max(x0));
        for x in x0..=x1 {
            if on(x - x0) {
                img.put_pixel(x, top, px);
                img.put_pixel(x, bottom, px);
            }
        }
        for y in y0..=y1 {
            if on(y - y0) {
                img.put_pixel(left, y, px);
                img.put_pixel(right, y, px);
            }
        }
    }
}

fn fill_rect(img: &mut RgbImage, rect: &Rect, color: Color) {
    let Some((x0, y0, x1, y1)) = pixel_bounds(img, rect) else {
        return;
    };
    let px = Rgb([color.0, color.1, color.2]);
    for y in y0..=y1 {
        for x in x0..=x1 {
            img.put_pixel(x, y, px);
        }
    }
}
