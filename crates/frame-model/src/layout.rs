//! Fixed layout constants for the single phone-frame template.
//!
//! Every animated quantity is derived from these values; nothing here is
//! ever mutated at runtime.

/// An 8-bit RGBA color with straight (non-premultiplied) alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const WHITE: Rgba8 = Rgba8::opaque(0xff, 0xff, 0xff);
    pub const BLACK: Rgba8 = Rgba8::opaque(0x00, 0x00, 0x00);

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }

    /// Black at the given opacity in `[0.0, 1.0]`.
    pub fn black_with_opacity(opacity: f32) -> Self {
        Self {
            r: 0,
            g: 0,
            b: 0,
            a: (opacity.clamp(0.0, 1.0) * 255.0).round() as u8,
        }
    }
}

/// Home indicator bar dimensions (unscaled).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomeIndicatorLayout {
    pub width: f64,
    pub height: f64,
    pub radius: f64,
    /// Distance from the frame's bottom edge to the bar's top edge.
    pub bottom_offset: f64,
}

/// Background grid parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    pub spacing: u32,
    pub line_width: f32,
    pub opacity: f32,
}

/// Drop shadow parameters (canvas-style blur radius).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowLayout {
    pub blur: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub opacity: f32,
}

/// Watermark text parameters. Independent of the pulse animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatermarkLayout {
    pub font_size: f32,
    /// Distance of the right edge and the baseline from the target's
    /// bottom-right corner.
    pub margin: f32,
    pub opacity: f32,
}

/// The complete set of constants anchoring the phone-frame template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConstants {
    /// Render target width in pixels (4:3 output).
    pub target_width: u32,
    /// Render target height in pixels.
    pub target_height: u32,

    pub frame_width: f64,
    pub frame_height: f64,
    pub frame_corner_radius: f64,

    /// Inset of the bezel stroke's center line; the stroke is twice as wide.
    pub border_inset: f64,
    pub inner_radius: f64,
    pub screen_inset: f64,

    pub home_indicator: HomeIndicatorLayout,
    pub grid: GridLayout,
    pub shadow: ShadowLayout,
    pub watermark: WatermarkLayout,

    pub frame_color: Rgba8,
    pub border_color: Rgba8,
    pub screen_color: Rgba8,
    pub home_indicator_color: Rgba8,
    pub background_color: Rgba8,
}

/// The one and only template.
pub const LAYOUT: LayoutConstants = LayoutConstants {
    target_width: 2400,
    target_height: 1800,

    frame_width: 700.0,
    frame_height: 1400.0,
    frame_corner_radius: 70.0,

    border_inset: 6.0,
    inner_radius: 64.0,
    screen_inset: 30.0,

    home_indicator: HomeIndicatorLayout {
        width: 120.0,
        height: 12.0,
        radius: 6.0,
        bottom_offset: 30.0,
    },
    grid: GridLayout {
        spacing: 60,
        line_width: 1.0,
        opacity: 0.08,
    },
    shadow: ShadowLayout {
        blur: 40.0,
        offset_x: 0.0,
        offset_y: 20.0,
        opacity: 0.2,
    },
    watermark: WatermarkLayout {
        font_size: 72.0,
        margin: 50.0,
        opacity: 0.4,
    },

    frame_color: Rgba8::opaque(0x1a, 0x1a, 0x1a),
    border_color: Rgba8::BLACK,
    screen_color: Rgba8::BLACK,
    home_indicator_color: Rgba8::opaque(0x33, 0x33, 0x33),
    background_color: Rgba8::WHITE,
};

/// Default watermark string.
pub const DEFAULT_BRAND_TEXT: &str = "Built on Vibe Code";

impl LayoutConstants {
    /// Width of the bezel stroke before pulsing.
    pub fn border_width(&self) -> f64 {
        self.border_inset * 2.0
    }

    /// Top-left corner of the unscaled frame, centered on the target.
    pub fn frame_origin(&self) -> (f64, f64) {
        (
            (self.target_width as f64 - self.frame_width) / 2.0,
            (self.target_height as f64 - self.frame_height) / 2.0,
        )
    }

    /// Aspect ratio of the render target.
    pub fn target_aspect(&self) -> f64 {
        self.target_width as f64 / self.target_height as f64
    }
}
