//! Animated phone-frame geometry.
//!
//! All coordinates are in render-target pixels, `(0, 0)` top-left.
//! The frame "breathes" by a periodic ±2% scale applied about its own
//! center, so it pulses in place instead of drifting.

use serde::{Deserialize, Serialize};

use crate::layout::{LayoutConstants, LAYOUT};

/// Amplitude of the pulse animation (fraction of the base size).
pub const PULSE_AMPLITUDE: f64 = 0.02;

/// Angular speed of the pulse animation (radians per second).
pub const PULSE_RATE: f64 = 2.0;

/// An axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Shrink by `amount` on every side.
    pub fn inset(&self, amount: f64) -> Rect {
        Rect {
            x: self.x + amount,
            y: self.y + amount,
            w: self.w - amount * 2.0,
            h: self.h - amount * 2.0,
        }
    }

    /// Scale about this rectangle's own center.
    pub fn scaled_about_center(&self, scale: f64) -> Rect {
        let w = self.w * scale;
        let h = self.h * scale;
        Rect {
            x: self.x - (w - self.w) / 2.0,
            y: self.y - (h - self.h) / 2.0,
            w,
            h,
        }
    }

    /// Whether `other` lies strictly inside this rectangle (no shared edge).
    pub fn strictly_contains(&self, other: &Rect) -> bool {
        other.x > self.x
            && other.y > self.y
            && other.right() < self.right()
            && other.bottom() < self.bottom()
    }
}

/// A rectangle with uniformly rounded corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundedRect {
    pub rect: Rect,
    pub radius: f64,
}

impl RoundedRect {
    pub fn new(rect: Rect, radius: f64) -> Self {
        Self { rect, radius }
    }

    /// Corner radius clamped so opposite corners never overlap.
    pub fn effective_radius(&self) -> f64 {
        self.radius
            .min(self.rect.w / 2.0)
            .min(self.rect.h / 2.0)
            .max(0.0)
    }
}

/// Geometry of one rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameGeometry {
    /// Uniform scale applied to everything pulse-dependent.
    pub pulse_scale: f64,

    /// Outer phone body.
    pub frame: RoundedRect,

    /// Center line of the bezel stroke.
    pub border: RoundedRect,

    /// Width of the bezel stroke.
    pub border_width: f64,

    /// Screen area; its radius matches the bezel's inner radius.
    pub screen: RoundedRect,

    /// Home indicator bar near the bottom of the frame.
    pub home_indicator: RoundedRect,
}

impl FrameGeometry {
    pub fn screen_rect(&self) -> Rect {
        self.screen.rect
    }
}

/// Scale factor of the pulse animation at `elapsed_secs`.
///
/// Always within `[0.98, 1.02]`, and exactly `1.0` at time zero.
pub fn pulse_scale(elapsed_secs: f64) -> f64 {
    1.0 + (elapsed_secs * PULSE_RATE).sin() * PULSE_AMPLITUDE
}

/// Compute the frame geometry of the default template at `elapsed_secs`.
pub fn compute_geometry(elapsed_secs: f64) -> FrameGeometry {
    compute_geometry_with(&LAYOUT, elapsed_secs)
}

/// Compute frame geometry for an explicit layout.
pub fn compute_geometry_with(layout: &LayoutConstants, elapsed_secs: f64) -> FrameGeometry {
    let pulse = pulse_scale(elapsed_secs);

    let (fx, fy) = layout.frame_origin();
    let base = Rect::new(fx, fy, layout.frame_width, layout.frame_height);
    let frame = base.scaled_about_center(pulse);

    let border_width = layout.border_width() * pulse;
    let inner_radius = layout.inner_radius * pulse;

    let border = RoundedRect::new(frame.inset(border_width / 2.0), inner_radius);
    let screen = RoundedRect::new(frame.inset(layout.screen_inset * pulse), inner_radius);

    let indicator = &layout.home_indicator;
    let (frame_cx, _) = frame.center();
    let home_indicator = RoundedRect::new(
        Rect::new(
            frame_cx - indicator.width * pulse / 2.0,
            frame.bottom() - indicator.bottom_offset * pulse,
            indicator.width * pulse,
            indicator.height * pulse,
        ),
        indicator.radius * pulse,
    );

    FrameGeometry {
        pulse_scale: pulse,
        frame: RoundedRect::new(frame, layout.frame_corner_radius * pulse),
        border,
        border_width,
        screen,
        home_indicator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pulse_is_identity_at_zero() {
        assert_eq!(pulse_scale(0.0), 1.0);
    }

    #[test]
    fn test_pulse_peaks() {
        let quarter = std::f64::consts::FRAC_PI_4;
        assert!((pulse_scale(quarter) - 1.02).abs() < 1e-12);
        assert!((pulse_scale(3.0 * quarter) - 0.98).abs() < 1e-12);
    }

    #[test]
    fn test_geometry_at_rest() {
        let g = compute_geometry(0.0);
        assert_eq!(g.frame.rect, Rect::new(850.0, 200.0, 700.0, 1400.0));
        assert_eq!(g.frame.radius, 70.0);
        assert_eq!(g.border.rect, Rect::new(856.0, 206.0, 688.0, 1388.0));
        assert_eq!(g.border_width, 12.0);
        assert_eq!(g.screen.rect, Rect::new(880.0, 230.0, 640.0, 1340.0));
        assert_eq!(g.screen.radius, 64.0);
        assert_eq!(g.home_indicator.rect, Rect::new(1140.0, 1570.0, 120.0, 12.0));
        assert_eq!(g.home_indicator.radius, 6.0);
    }

    #[test]
    fn test_frame_pulses_about_its_center() {
        let rest = compute_geometry(0.0).frame.rect.center();
        let peak = compute_geometry(std::f64::consts::FRAC_PI_4).frame.rect;
        let (cx, cy) = peak.center();
        assert!((cx - rest.0).abs() < 1e-9);
        assert!((cy - rest.1).abs() < 1e-9);
        assert!((peak.w - 714.0).abs() < 1e-9);
    }

    #[test]
    fn test_screen_radius_matches_border_radius() {
        let g = compute_geometry(1.234);
        assert_eq!(g.screen.radius, g.border.radius);
    }

    #[test]
    fn test_effective_radius_is_clamped() {
        let rr = RoundedRect::new(Rect::new(0.0, 0.0, 10.0, 40.0), 30.0);
        assert_eq!(rr.effective_radius(), 5.0);
    }

    proptest! {
        #[test]
        fn prop_pulse_stays_in_band(t in -1.0e6f64..1.0e6f64) {
            let p = pulse_scale(t);
            prop_assert!((0.98..=1.02).contains(&p));
        }

        #[test]
        fn prop_geometry_is_pure(t in 0.0f64..10_000.0f64) {
            let a = compute_geometry(t);
            let b = compute_geometry(t);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_screen_strictly_inside_frame(t in 0.0f64..10_000.0f64) {
            let g = compute_geometry(t);
            prop_assert!(g.frame.rect.strictly_contains(&g.screen.rect));
            prop_assert!(g.frame.rect.strictly_contains(&g.border.rect));
            prop_assert!(g.frame.rect.strictly_contains(&g.home_indicator.rect));
        }

        #[test]
        fn prop_frame_stays_on_target(t in 0.0f64..10_000.0f64) {
            let g = compute_geometry(t);
            let target = Rect::new(0.0, 0.0, LAYOUT.target_width as f64, LAYOUT.target_height as f64);
            prop_assert!(target.strictly_contains(&g.frame.rect));
        }
    }
}
