//! Source video contract.

use std::time::Duration;

use phoneframe_common::error::{PhoneframeError, PhoneframeResult};

/// One decoded source frame: straight-alpha RGBA8, rows tightly packed.
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

impl<'a> VideoFrame<'a> {
    /// Wrap `data`, checking it holds exactly `width * height` pixels.
    pub fn new(width: u32, height: u32, data: &'a [u8]) -> PhoneframeResult<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(PhoneframeError::transient_frame_read(format!(
                "frame buffer of {} bytes does not match {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }
}

/// A playing video the compositor can sample once per tick.
///
/// Owned by the caller. The export core only reads frames and, once before
/// recording, asks for playback to restart from zero.
pub trait SourceFrameProvider: Send {
    /// Natural pixel dimensions of the video (both > 0).
    fn natural_size(&self) -> (u32, u32);

    /// Total duration, if the container reports one.
    fn duration(&self) -> Option<Duration>;

    /// Current playback position.
    fn position(&self) -> Duration;

    /// Whether a displayable frame is available right now.
    fn is_frame_ready(&self) -> bool;

    /// Read the frame at the current playback position.
    ///
    /// Failures are expected to be transient; the compositor skips the
    /// video layer for that tick.
    fn read_frame(&mut self) -> PhoneframeResult<VideoFrame<'_>>;

    /// Seek to zero and start playing.
    fn play_from_start(&mut self) -> PhoneframeResult<()>;
}
