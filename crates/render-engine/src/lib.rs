//! Phoneframe Render Engine
//!
//! Draws one complete output frame per tick: the animated phone frame
//! around whatever the source video shows at that moment.
//!
//! # Layer Order
//!
//! ```text
//!  1. white background ───────────────┐
//!  2. grid (60px, 8% black)           │
//!  3. drop shadow (blur 40, +20y)     │
//!  4. phone body (#1a1a1a)            │  RenderTarget
//!  5. bezel stroke (#000)             ├─► 2400 x 1800
//!  6. screen (#000)                   │
//!  7. source video, clipped to screen │
//!  8. home indicator (#333)           │
//!  9. watermark text ─────────────────┘
//! ```

pub mod compositor;
pub mod shadow;
pub mod shapes;
pub mod source;
pub mod surface;
pub mod watermark;

pub use compositor::*;
pub use source::*;
pub use surface::*;
