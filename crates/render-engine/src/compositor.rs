//! Frame compositor: draws the phone frame around the live source video.
//!
//! One call to [`Compositor::render_frame`] produces one complete output
//! frame. The render target is reused across ticks, so every frame starts
//! from an opaque fill and nothing from the previous tick survives.

use std::path::PathBuf;

use phoneframe_common::error::{PhoneframeError, PhoneframeResult};
use phoneframe_frame_model::{
    fit_source, FitPolicy, FrameGeometry, LayoutConstants, Rgba8, RoundedRect, DEFAULT_BRAND_TEXT,
    LAYOUT,
};
use tiny_skia::{Color, FillRule, FilterQuality, Mask, Pixmap, PixmapPaint, Stroke, Transform};

use crate::shadow::ShadowSprite;
use crate::shapes::{line_path, rounded_rect_path, solid_paint};
use crate::source::{SourceFrameProvider, VideoFrame};
use crate::surface::RenderTarget;
use crate::watermark::Watermark;

/// Construction options for a [`Compositor`].
#[derive(Debug, Clone)]
pub struct CompositorOptions {
    /// How the source is placed inside the screen.
    pub fit_policy: FitPolicy,

    /// Watermark text; empty disables the watermark.
    pub brand_text: String,

    /// Font for the watermark. System fonts are searched when unset.
    pub font_path: Option<PathBuf>,
}

impl Default for CompositorOptions {
    fn default() -> Self {
        Self {
            fit_policy: FitPolicy::Width,
            brand_text: DEFAULT_BRAND_TEXT.to_string(),
            font_path: None,
        }
    }
}

/// What happened to the video layer during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoLayer {
    /// The source frame was drawn into the screen.
    Drawn,
    /// No source, or the source had no displayable frame.
    NotReady,
    /// Reading the frame failed; the layer was skipped for this tick.
    ReadFailed,
}

/// Per-session compositor state: static layers and reusable scratch buffers.
pub struct Compositor {
    layout: LayoutConstants,
    fit_policy: FitPolicy,
    grid: Pixmap,
    shadow: ShadowSprite,
    watermark: Option<Watermark>,
    clip: Mask,
    video: Option<Pixmap>,
    frames_rendered: u64,
    read_failures: u64,
}

impl Compositor {
    /// Build a compositor for the default template.
    pub fn new(options: &CompositorOptions) -> PhoneframeResult<Self> {
        let watermark = Watermark::load(
            options.font_path.as_deref(),
            &options.brand_text,
            &LAYOUT.watermark,
        );
        Self::with_watermark(LAYOUT, options.fit_policy, watermark)
    }

    /// Build a compositor with an explicit (possibly absent) watermark.
    pub fn with_watermark(
        layout: LayoutConstants,
        fit_policy: FitPolicy,
        watermark: Option<Watermark>,
    ) -> PhoneframeResult<Self> {
        let grid = build_grid(&layout)?;
        let shadow = ShadowSprite::build(&layout)?;
        let clip = Mask::new(layout.target_width, layout.target_height)
            .ok_or_else(|| PhoneframeError::render("Failed to allocate screen clip mask"))?;

        tracing::debug!(
            fit = fit_policy.as_str(),
            watermark = watermark.is_some(),
            "Compositor ready"
        );

        Ok(Self {
            layout,
            fit_policy,
            grid,
            shadow,
            watermark,
            clip,
            video: None,
            frames_rendered: 0,
            read_failures: 0,
        })
    }

    pub fn fit_policy(&self) -> FitPolicy {
        self.fit_policy
    }

    pub fn has_watermark(&self) -> bool {
        self.watermark.is_some()
    }

    /// Frames drawn so far.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Ticks whose video layer was skipped because the read failed.
    pub fn read_failures(&self) -> u64 {
        self.read_failures
    }

    /// Draw one complete frame into `target`.
    ///
    /// The layer order is fixed. A failing frame read only drops the video
    /// layer for this tick; it never fails the frame.
    pub fn render_frame(
        &mut self,
        target: &mut RenderTarget,
        geometry: &FrameGeometry,
        source: Option<&mut dyn SourceFrameProvider>,
    ) -> VideoLayer {
        let layout = self.layout;
        let pixmap = target.pixmap_mut();

        // 1. background
        let bg = layout.background_color;
        pixmap.fill(Color::from_rgba8(bg.r, bg.g, bg.b, 255));

        // 2. grid
        pixmap.draw_pixmap(
            0,
            0,
            self.grid.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );

        // 3. shadow, a separate sprite so it cannot bleed onto later shapes
        self.shadow.draw(pixmap, geometry);

        // 4. phone body
        fill_rounded(pixmap, &geometry.frame, layout.frame_color);

        // 5. bezel
        if let Some(path) = rounded_rect_path(&geometry.border) {
            let stroke = Stroke {
                width: geometry.border_width as f32,
                ..Stroke::default()
            };
            pixmap.stroke_path(
                &path,
                &solid_paint(layout.border_color),
                &stroke,
                Transform::identity(),
                None,
            );
        }

        // 6. screen
        fill_rounded(pixmap, &geometry.screen, layout.screen_color);

        // 7. video
        let video = match source {
            Some(source) => self.draw_video(pixmap, geometry, source),
            None => VideoLayer::NotReady,
        };

        // 8. home indicator
        fill_rounded(
            pixmap,
            &geometry.home_indicator,
            layout.home_indicator_color,
        );

        // 9. watermark
        if let Some(watermark) = &self.watermark {
            watermark.draw(pixmap, &layout);
        }

        self.frames_rendered += 1;
        tracing::trace!(
            frame = self.frames_rendered,
            pulse = geometry.pulse_scale,
            ?video,
            "Frame composited"
        );
        video
    }

    fn draw_video(
        &mut self,
        pixmap: &mut Pixmap,
        geometry: &FrameGeometry,
        source: &mut dyn SourceFrameProvider,
    ) -> VideoLayer {
        if !source.is_frame_ready() {
            return VideoLayer::NotReady;
        }

        let position = source.position();
        let frame = match source.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.read_failures += 1;
                tracing::warn!(
                    error = %e,
                    position_ms = position.as_millis() as u64,
                    "Skipping video layer for this frame"
                );
                return VideoLayer::ReadFailed;
            }
        };

        let Some(dest) = fit_source(
            self.fit_policy,
            frame.width,
            frame.height,
            &geometry.screen.rect,
        ) else {
            return VideoLayer::NotReady;
        };

        let video = match upload_frame(&mut self.video, &frame) {
            Ok(video) => video,
            Err(e) => {
                self.read_failures += 1;
                tracing::warn!(error = %e, "Skipping video layer for this frame");
                return VideoLayer::ReadFailed;
            }
        };

        let Some(screen_path) = rounded_rect_path(&geometry.screen) else {
            return VideoLayer::NotReady;
        };
        self.clip.data_mut().fill(0);
        self.clip
            .fill_path(&screen_path, FillRule::Winding, true, Transform::identity());

        let sx = (dest.w / video.width() as f64) as f32;
        let sy = (dest.h / video.height() as f64) as f32;
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        pixmap.draw_pixmap(
            0,
            0,
            video.as_ref(),
            &paint,
            Transform::from_row(sx, 0.0, 0.0, sy, dest.x as f32, dest.y as f32),
            Some(&self.clip),
        );
        VideoLayer::Drawn
    }
}

fn fill_rounded(pixmap: &mut Pixmap, shape: &RoundedRect, color: Rgba8) {
    if let Some(path) = rounded_rect_path(shape) {
        pixmap.fill_path(
            &path,
            &solid_paint(color),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
    }
}

/// Transparent layer holding the background grid lines.
fn build_grid(layout: &LayoutConstants) -> PhoneframeResult<Pixmap> {
    let w = layout.target_width;
    let h = layout.target_height;
    let mut grid =
        Pixmap::new(w, h).ok_or_else(|| PhoneframeError::render("Failed to allocate grid layer"))?;

    let paint = solid_paint(Rgba8::black_with_opacity(layout.grid.opacity));
    let stroke = Stroke {
        width: layout.grid.line_width,
        ..Stroke::default()
    };
    let spacing = layout.grid.spacing.max(1) as usize;

    // Each line is stroked on its own, so crossings are slightly darker.
    for x in (0..=w).step_by(spacing) {
        if let Some(path) = line_path(x as f32, 0.0, x as f32, h as f32) {
            grid.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }
    for y in (0..=h).step_by(spacing) {
        if let Some(path) = line_path(0.0, y as f32, w as f32, y as f32) {
            grid.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }

    Ok(grid)
}

/// Copy a straight-alpha source frame into the reusable premultiplied
/// scratch pixmap, reallocating only when the source size changes.
fn upload_frame<'a>(
    slot: &'a mut Option<Pixmap>,
    frame: &VideoFrame<'_>,
) -> PhoneframeResult<&'a Pixmap> {
    let needs_alloc = slot
        .as_ref()
        .map_or(true, |p| p.width() != frame.width || p.height() != frame.height);
    if needs_alloc {
        *slot = Some(Pixmap::new(frame.width, frame.height).ok_or_else(|| {
            PhoneframeError::transient_frame_read(format!(
                "Failed to allocate {}x{} video buffer",
                frame.width, frame.height
            ))
        })?);
    }
    let Some(pixmap) = slot.as_mut() else {
        return Err(PhoneframeError::render("Video buffer missing"));
    };

    for (dst, src) in pixmap
        .data_mut()
        .chunks_exact_mut(4)
        .zip(frame.data.chunks_exact(4))
    {
        let a = src[3];
        if a == 255 {
            dst.copy_from_slice(src);
        } else {
            dst[0] = premultiply(src[0], a);
            dst[1] = premultiply(src[1], a);
            dst[2] = premultiply(src[2], a);
            dst[3] = a;
        }
    }
    Ok(pixmap)
}

fn premultiply(c: u8, a: u8) -> u8 {
    ((c as u16 * a as u16 + 127) / 255) as u8
}
