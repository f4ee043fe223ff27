//! Phoneframe Capture Engine
//!
//! Records the composited phone frame into a video file. An export runs as
//! a single [`EncoderSession`] driven by the [`ExportDriver`] render loop.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     ExportDriver                     │
//! │  ticks ─┐   duration ─┐   cancel ─┐   encoder ─┐     │
//! │         ▼             ▼           ▼            ▼     │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │                 EncoderSession                 │  │
//! │  │  Compositor ─► RenderTarget ─► CaptureSurface  │  │
//! │  │                 chunks ◄───────────┘           │  │
//! │  └───────────────────────┬────────────────────────┘  │
//! │                          ▼                           │
//! │          OutputArtifact ─► DownloadSink              │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod artifact;
pub mod export;
pub mod ffmpeg;
pub mod negotiate;
pub mod pipeline;
pub mod session;
pub mod source;

pub use artifact::*;
pub use export::*;
pub use negotiate::*;
pub use pipeline::*;
pub use session::*;
