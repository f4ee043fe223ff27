//! Watermark text rasterized with fontdue.
//!
//! The text never animates, so it is rasterized once into a sprite and
//! blitted at a fixed position every tick.

use std::path::{Path, PathBuf};

use fontdue::{Font, FontSettings};
use phoneframe_common::error::{PhoneframeError, PhoneframeResult};
use phoneframe_frame_model::{LayoutConstants, WatermarkLayout};
use tiny_skia::{Pixmap, PixmapPaint, Transform};

/// Fonts tried, in order, when no font path is configured.
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/nunito/Nunito-Regular.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Pre-rendered watermark text.
pub struct Watermark {
    sprite: Pixmap,
    /// Distance from the sprite's top edge to the text baseline.
    ascent: i32,
}

impl Watermark {
    /// Rasterize `text` with the font in `font_bytes`.
    pub fn from_font_bytes(
        font_bytes: &[u8],
        text: &str,
        layout: &WatermarkLayout,
    ) -> PhoneframeResult<Self> {
        if text.is_empty() {
            return Err(PhoneframeError::render("Watermark text is empty"));
        }
        let font = Font::from_bytes(font_bytes, FontSettings::default())
            .map_err(|e| PhoneframeError::render(format!("Invalid watermark font: {e}")))?;

        let size = layout.font_size;
        let glyphs: Vec<_> = text.chars().map(|ch| font.rasterize(ch, size)).collect();

        let mut advance = 0.0f32;
        let mut ascent = 0i32;
        let mut descent = 0i32;
        for (metrics, _) in &glyphs {
            ascent = ascent.max(metrics.height as i32 + metrics.ymin);
            descent = descent.max(-metrics.ymin);
            advance += metrics.advance_width;
        }

        let width = advance.ceil().max(1.0) as u32;
        let height = (ascent + descent).max(1) as u32;
        let mut sprite = Pixmap::new(width, height)
            .ok_or_else(|| PhoneframeError::render("Failed to allocate watermark sprite"))?;

        let opacity = layout.opacity.clamp(0.0, 1.0);
        let stride = width as i32;
        let data = sprite.data_mut();
        let mut pen_x = 0.0f32;
        for (metrics, coverage) in &glyphs {
            let gx0 = pen_x.round() as i32 + metrics.xmin;
            let gy0 = ascent - (metrics.height as i32 + metrics.ymin);
            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let c = coverage[gy * metrics.width + gx];
                    if c == 0 {
                        continue;
                    }
                    let px = gx0 + gx as i32;
                    let py = gy0 + gy as i32;
                    if px < 0 || py < 0 || px >= stride || py >= height as i32 {
                        continue;
                    }
                    let idx = ((py * stride + px) * 4) as usize;
                    let a = (c as f32 * opacity).round() as u8;
                    // Premultiplied black; overlapping glyph edges keep the denser coverage.
                    data[idx + 3] = data[idx + 3].max(a);
                }
            }
            pen_x += metrics.advance_width;
        }

        Ok(Self { sprite, ascent })
    }

    /// Load a font from `font_path`, or the first available system font,
    /// and rasterize `text`. Returns `None` (after logging) when no usable
    /// font exists or the text is empty.
    pub fn load(font_path: Option<&Path>, text: &str, layout: &WatermarkLayout) -> Option<Self> {
        if text.is_empty() {
            return None;
        }

        let candidates: Vec<PathBuf> = match font_path {
            Some(path) => vec![path.to_path_buf()],
            None => SYSTEM_FONT_CANDIDATES.iter().map(PathBuf::from).collect(),
        };

        for path in candidates {
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            match Self::from_font_bytes(&bytes, text, layout) {
                Ok(watermark) => {
                    tracing::debug!(font = %path.display(), "Watermark font loaded");
                    return Some(watermark);
                }
                Err(e) => {
                    tracing::warn!(font = %path.display(), error = %e, "Skipping unusable font");
                }
            }
        }

        tracing::warn!("No usable font found; watermark will not be drawn");
        None
    }

    pub fn width(&self) -> u32 {
        self.sprite.width()
    }

    pub fn height(&self) -> u32 {
        self.sprite.height()
    }

    /// Draw right-aligned with the baseline `margin` pixels above the
    /// bottom edge and the right edge `margin` pixels from the right.
    pub fn draw(&self, pixmap: &mut Pixmap, layout: &LayoutConstants) {
        let margin = layout.watermark.margin.round() as i32;
        let x = layout.target_width as i32 - margin - self.sprite.width() as i32;
        let y = layout.target_height as i32 - margin - self.ascent;
        pixmap.draw_pixmap(
            x,
            y,
            self.sprite.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }
}
