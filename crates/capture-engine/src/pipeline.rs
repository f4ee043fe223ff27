//! Capture surface and encoder backend contract.
//!
//! A backend opens a live capture surface for a negotiated codec. The
//! session pushes every rendered frame into the surface; encoded output
//! comes back asynchronously as ordered [`EncoderEvent`]s. Backend worker
//! threads only ever post events; they never touch session state.

use std::time::Duration;

use phoneframe_common::error::PhoneframeResult;
use phoneframe_render_engine::RenderTarget;
use tokio::sync::mpsc::UnboundedSender;

use crate::negotiate::NegotiatedCodec;

/// Notifications from a running encoder, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// A piece of encoded output.
    Chunk(Vec<u8>),
    /// All output has been emitted after a stop request.
    Flushed,
    /// The encoder failed and will emit nothing further.
    Fault(String),
}

/// Sender half handed to a backend when a surface is opened.
pub type EncoderEventSender = UnboundedSender<EncoderEvent>;

/// A live stream sourced from the render target, consumed by an encoder.
pub trait CaptureSurface: Send {
    /// Submit the current contents of `target`, captured `timestamp`
    /// after recording started.
    fn push_frame(&mut self, target: &RenderTarget, timestamp: Duration) -> PhoneframeResult<()>;

    /// Ask the encoder to flush. Remaining chunks followed by
    /// [`EncoderEvent::Flushed`] arrive later on the event channel.
    fn request_stop(&mut self) -> PhoneframeResult<()>;

    /// Release every underlying resource. Must be safe to call more than
    /// once and in any state.
    fn release(&mut self);

    /// Runtime statistics.
    fn stats(&self) -> PipelineStats;
}

/// Creates capture surfaces.
pub trait EncoderBackend: Send {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Start an encoder for `codec` consuming `width x height` frames at
    /// `fps`. Fails with `CaptureUnavailable` when the environment cannot
    /// provide a capture surface.
    fn open(
        &mut self,
        codec: &NegotiatedCodec,
        fps: u32,
        width: u32,
        height: u32,
        events: EncoderEventSender,
    ) -> PhoneframeResult<Box<dyn CaptureSurface>>;
}

/// Runtime statistics from a capture surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    /// Rendered frames handed to the encoder.
    pub frames_captured: u64,

    /// Extra copies written to fill gaps left by dropped frames.
    pub frames_duplicated: u64,

    /// Rendered frames the encoder could not accept in time.
    pub frames_dropped: u64,

    /// Raw bytes written to the encoder.
    pub bytes_written: u64,
}

impl PipelineStats {
    /// Share of rendered frames that were dropped, as a percentage.
    pub fn drop_rate(&self) -> f64 {
        let total = self.frames_captured + self.frames_dropped;
        if total == 0 {
            return 0.0;
        }
        self.frames_dropped as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_rate() {
        assert_eq!(PipelineStats::default().drop_rate(), 0.0);
        let stats = PipelineStats {
            frames_captured: 90,
            frames_duplicated: 10,
            frames_dropped: 10,
            bytes_written: 0,
        };
        // Gap-fill copies are not rendered frames.
        assert!((stats.drop_rate() - 10.0).abs() < 1e-9);
    }
}
