//! Placement of a source video inside the phone screen.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// How a source frame is fitted into the screen rectangle.
///
/// `Width` is the canonical policy. `Contain` is kept as a separate,
/// explicitly selectable alternative and is never applied implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitPolicy {
    /// Scale to exactly fill the screen width and center vertically,
    /// cropping top/bottom or letterboxing as needed.
    #[default]
    Width,
    /// Scale by whichever dimension is tighter and letterbox or pillarbox
    /// the other; never crops.
    Contain,
}

impl FitPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitPolicy::Width => "width",
            FitPolicy::Contain => "contain",
        }
    }
}

impl std::str::FromStr for FitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "width" => Ok(FitPolicy::Width),
            "contain" => Ok(FitPolicy::Contain),
            other => Err(format!("unknown fit policy: {other} (use: width, contain)")),
        }
    }
}

/// Destination rectangle for a `source_width × source_height` frame drawn
/// into `screen` under `policy`.
///
/// The result may extend past `screen` (cropping); callers clip to the
/// screen shape. Returns `None` for degenerate source dimensions.
pub fn fit_source(
    policy: FitPolicy,
    source_width: u32,
    source_height: u32,
    screen: &Rect,
) -> Option<Rect> {
    if source_width == 0 || source_height == 0 || screen.w <= 0.0 || screen.h <= 0.0 {
        return None;
    }
    let aspect = source_width as f64 / source_height as f64;

    let (w, h) = match policy {
        FitPolicy::Width => (screen.w, screen.w / aspect),
        FitPolicy::Contain => {
            if aspect > screen.w / screen.h {
                (screen.w, screen.w / aspect)
            } else {
                (screen.h * aspect, screen.h)
            }
        }
    };

    // Centering covers both letterboxing (h < screen.h) and cropping
    // (h > screen.h, negative offset).
    Some(Rect {
        x: screen.x + (screen.w - w) / 2.0,
        y: screen.y + (screen.h - h) / 2.0,
        w,
        h,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen() -> Rect {
        Rect::new(880.0, 230.0, 640.0, 1340.0)
    }

    #[test]
    fn test_landscape_source_is_letterboxed() {
        let r = fit_source(FitPolicy::Width, 1920, 1080, &screen()).unwrap();
        assert_eq!(r.x, 880.0);
        assert_eq!(r.w, 640.0);
        assert!((r.h - 360.0).abs() < 1e-9);
        assert!((r.y - (230.0 + 490.0)).abs() < 1e-9);
    }

    #[test]
    fn test_tall_source_is_cropped_top_and_bottom() {
        let r = fit_source(FitPolicy::Width, 500, 2000, &screen()).unwrap();
        assert_eq!(r.w, 640.0);
        assert!((r.h - 2560.0).abs() < 1e-9);
        assert!(r.y < 230.0);
        assert!(r.bottom() > 230.0 + 1340.0);
        let (_, cy) = r.center();
        assert!((cy - screen().center().1).abs() < 1e-9);
    }

    #[test]
    fn test_contain_pillarboxes_tall_source() {
        let r = fit_source(FitPolicy::Contain, 500, 2000, &screen()).unwrap();
        assert_eq!(r.h, 1340.0);
        assert!((r.w - 335.0).abs() < 1e-9);
        assert!(r.x > 880.0);
        assert!(r.right() < 880.0 + 640.0);
    }

    #[test]
    fn test_contain_matches_width_for_wide_source() {
        let a = fit_source(FitPolicy::Contain, 1920, 1080, &screen()).unwrap();
        let b = fit_source(FitPolicy::Width, 1920, 1080, &screen()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_degenerate_source_has_no_placement() {
        assert!(fit_source(FitPolicy::Width, 0, 1080, &screen()).is_none());
    }

    #[test]
    fn test_policy_parses() {
        assert_eq!("contain".parse::<FitPolicy>().unwrap(), FitPolicy::Contain);
        assert!("cover".parse::<FitPolicy>().is_err());
    }
}
