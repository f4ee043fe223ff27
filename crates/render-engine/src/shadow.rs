//! Soft drop shadow behind the phone frame.
//!
//! The shadow is rasterized once, at the unpulsed frame size and at a
//! quarter of the target resolution, blurred, and then drawn each tick
//! scaled up (and by the pulse) with bilinear filtering. The pulse only
//! varies the size by ±2%, so the blur radius drift is invisible.

use phoneframe_common::error::{PhoneframeError, PhoneframeResult};
use phoneframe_frame_model::{FrameGeometry, LayoutConstants, Rect, RoundedRect};
use tiny_skia::{FillRule, FilterQuality, Mask, Pixmap, PixmapPaint, Transform};

use crate::shapes::rounded_rect_path;

/// Resolution divisor of the cached shadow sprite.
const DOWNSAMPLE: f64 = 4.0;

/// A pre-blurred shadow sprite centered on the unpulsed frame.
pub struct ShadowSprite {
    sprite: Pixmap,
    offset_x: f32,
    offset_y: f32,
}

impl ShadowSprite {
    /// Rasterize and blur the shadow for `layout`.
    pub fn build(layout: &LayoutConstants) -> PhoneframeResult<Self> {
        let shadow = &layout.shadow;
        // Canvas blur radius maps to a gaussian with sigma = blur / 2.
        let sigma = shadow.blur as f64 / 2.0 / DOWNSAMPLE;
        let radius = (sigma * 3.0).ceil() as u32;
        let pad = radius as f64;

        let w = (layout.frame_width / DOWNSAMPLE + pad * 2.0).ceil() as u32;
        let h = (layout.frame_height / DOWNSAMPLE + pad * 2.0).ceil() as u32;

        let mut mask = Mask::new(w, h)
            .ok_or_else(|| PhoneframeError::render("Failed to allocate shadow mask"))?;
        let body = RoundedRect::new(
            Rect::new(
                pad,
                pad,
                layout.frame_width / DOWNSAMPLE,
                layout.frame_height / DOWNSAMPLE,
            ),
            layout.frame_corner_radius / DOWNSAMPLE,
        );
        let path = rounded_rect_path(&body)
            .ok_or_else(|| PhoneframeError::render("Degenerate shadow shape"))?;
        mask.fill_path(&path, FillRule::Winding, true, Transform::identity());

        let blurred = blur_alpha(mask.data(), w, h, radius, sigma as f32);

        let mut sprite = Pixmap::new(w, h)
            .ok_or_else(|| PhoneframeError::render("Failed to allocate shadow sprite"))?;
        let opacity = shadow.opacity.clamp(0.0, 1.0);
        for (px, &a) in sprite.data_mut().chunks_exact_mut(4).zip(blurred.iter()) {
            // Premultiplied black: only alpha carries information.
            px[3] = (a as f32 * opacity).round() as u8;
        }

        Ok(Self {
            sprite,
            offset_x: shadow.offset_x,
            offset_y: shadow.offset_y,
        })
    }

    /// Draw the shadow under `geometry`'s frame.
    pub fn draw(&self, pixmap: &mut Pixmap, geometry: &FrameGeometry) {
        let scale = (DOWNSAMPLE * geometry.pulse_scale) as f32;
        let (cx, cy) = geometry.frame.rect.center();
        let tx = cx as f32 - self.sprite.width() as f32 * scale / 2.0 + self.offset_x;
        let ty = cy as f32 - self.sprite.height() as f32 * scale / 2.0 + self.offset_y;

        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        pixmap.draw_pixmap(
            0,
            0,
            self.sprite.as_ref(),
            &paint,
            Transform::from_row(scale, 0.0, 0.0, scale, tx, ty),
            None,
        );
    }
}

/// Separable gaussian blur of a single 8-bit channel.
pub fn blur_alpha(src: &[u8], width: u32, height: u32, radius: u32, sigma: f32) -> Vec<u8> {
    if radius == 0 || !sigma.is_finite() || sigma <= 0.0 {
        return src.to_vec();
    }
    let kernel = gaussian_kernel_q16(radius, sigma);
    let mut tmp = vec![0u8; src.len()];
    let mut out = vec![0u8; src.len()];

    let w = width as i32;
    let h = height as i32;
    let r = radius as i32;

    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u64;
            for (ki, &kw) in kernel.iter().enumerate() {
                let sx = x + ki as i32 - r;
                // Outside the mask is transparent.
                if (0..w).contains(&sx) {
                    acc += kw as u64 * src[(y * w + sx) as usize] as u64;
                }
            }
            tmp[(y * w + x) as usize] = q16_to_u8(acc);
        }
    }

    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u64;
            for (ki, &kw) in kernel.iter().enumerate() {
                let sy = y + ki as i32 - r;
                if (0..h).contains(&sy) {
                    acc += kw as u64 * tmp[(sy * w + x) as usize] as u64;
                }
            }
            out[(y * w + x) as usize] = q16_to_u8(acc);
        }
    }

    out
}

/// Normalized gaussian weights in 16.16 fixed point, summing to exactly 1.
fn gaussian_kernel_q16(radius: u32, sigma: f32) -> Vec<u32> {
    let r = radius as i32;
    let denom = 2.0 * (sigma as f64) * (sigma as f64);
    let weights: Vec<f64> = (-r..=r)
        .map(|i| (-(i as f64) * (i as f64) / denom).exp())
        .collect();
    let sum: f64 = weights.iter().sum();

    let mut q: Vec<u32> = weights
        .iter()
        .map(|w| ((w / sum) * 65536.0).round().clamp(0.0, 65536.0) as u32)
        .collect();
    let total: i64 = q.iter().map(|&v| v as i64).sum();
    let mid = q.len() / 2;
    q[mid] = (q[mid] as i64 + (65536 - total)).clamp(0, 65536) as u32;
    q
}

fn q16_to_u8(acc: u64) -> u8 {
    ((acc + 32768) >> 16).min(255) as u8
}
