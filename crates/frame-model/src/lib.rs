//! Phoneframe Frame Model
//!
//! Pure data and math for the phone-frame overlay:
//! - Fixed layout constants (target size, frame proportions, decorations)
//! - The animated geometry of the frame for a given elapsed time
//! - Fit policies that place a source video inside the screen

pub mod fit;
pub mod geometry;
pub mod layout;

pub use fit::*;
pub use geometry::*;
pub use layout::*;
