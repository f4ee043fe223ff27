//! Path construction helpers.

use phoneframe_frame_model::{Rgba8, RoundedRect};
use tiny_skia::{Paint, Path, PathBuilder};

/// Cubic Bézier handle length for a quarter circle of radius 1.
const KAPPA: f32 = 0.552_284_8;

/// Closed path of a rounded rectangle, drawn clockwise from the top edge.
pub fn rounded_rect_path(shape: &RoundedRect) -> Option<Path> {
    let r = shape.effective_radius() as f32;
    let x = shape.rect.x as f32;
    let y = shape.rect.y as f32;
    let w = shape.rect.w as f32;
    let h = shape.rect.h as f32;
    if w <= 0.0 || h <= 0.0 {
        return None;
    }

    let k = r * KAPPA;
    let right = x + w;
    let bottom = y + h;

    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(right - r, y);
    pb.cubic_to(right - r + k, y, right, y + r - k, right, y + r);
    pb.line_to(right, bottom - r);
    pb.cubic_to(right, bottom - r + k, right - r + k, bottom, right - r, bottom);
    pb.line_to(x + r, bottom);
    pb.cubic_to(x + r - k, bottom, x, bottom - r + k, x, bottom - r);
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);
    pb.close();
    pb.finish()
}

/// Straight line segment from `(x0, y0)` to `(x1, y1)`.
pub fn line_path(x0: f32, y0: f32, x1: f32, y1: f32) -> Option<Path> {
    let mut pb = PathBuilder::new();
    pb.move_to(x0, y0);
    pb.line_to(x1, y1);
    pb.finish()
}

/// Anti-aliased solid paint.
pub fn solid_paint(color: Rgba8) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint
}
