//! The fixed-resolution render target.

use std::path::Path;

use phoneframe_common::error::{PhoneframeError, PhoneframeResult};
use phoneframe_frame_model::{LayoutConstants, LAYOUT};
use tiny_skia::Pixmap;

/// A fixed-size RGBA drawing surface.
///
/// Created once per export session and reused for every tick; it is never
/// resized or replaced. Pixels are stored premultiplied, but every rendered
/// frame starts from an opaque fill so the bytes are also valid straight
/// RGBA once a frame has been drawn.
pub struct RenderTarget {
    pixmap: Pixmap,
}

impl RenderTarget {
    /// Allocate a target for the default template (2400 x 1800).
    pub fn new() -> PhoneframeResult<Self> {
        Self::for_layout(&LAYOUT)
    }

    /// Allocate a target sized for `layout`.
    pub fn for_layout(layout: &LayoutConstants) -> PhoneframeResult<Self> {
        let pixmap = Pixmap::new(layout.target_width, layout.target_height).ok_or_else(|| {
            PhoneframeError::render(format!(
                "Failed to allocate {}x{} render target",
                layout.target_width, layout.target_height
            ))
        })?;
        Ok(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Size in bytes of one raw RGBA frame.
    pub fn frame_len(&self) -> usize {
        self.pixmap.data().len()
    }

    /// Raw RGBA bytes, row-major, tightly packed.
    pub fn rgba_bytes(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Straight-alpha RGBA value of one pixel, `None` outside the target.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        // tiny-skia only bounds-checks the flat index.
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let p = self.pixmap.pixel(x, y)?.demultiply();
        Some([p.red(), p.green(), p.blue(), p.alpha()])
    }

    /// Write the current contents as a PNG file.
    pub fn save_png(&self, path: &Path) -> PhoneframeResult<()> {
        self.pixmap
            .save_png(path)
            .map_err(|e| PhoneframeError::render(format!("Failed to write {}: {e}", path.display())))
    }

    pub(crate) fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_target_dimensions() {
        let target = RenderTarget::new().unwrap();
        assert_eq!(target.width(), 2400);
        assert_eq!(target.height(), 1800);
        assert_eq!(target.frame_len(), 2400 * 1800 * 4);
    }

    #[test]
    fn test_new_target_is_transparent() {
        let target = RenderTarget::new().unwrap();
        assert_eq!(target.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(target.pixel(2400, 0), None);
    }

    #[test]
    fn test_pixel_does_not_wrap_to_next_row() {
        let mut target = RenderTarget::new().unwrap();
        target
            .pixmap_mut()
            .fill(tiny_skia::Color::from_rgba8(10, 20, 30, 255));
        assert_eq!(target.pixel(2399, 1799), Some([10, 20, 30, 255]));
        assert_eq!(target.pixel(2400, 5), None);
        assert_eq!(target.pixel(0, 1800), None);
        assert_eq!(target.pixel(u32::MAX, 0), None);
    }
}
