//! Encoder session state machine.
//!
//! ```text
//!  Idle ──► Negotiating ──► Recording ──► Finalizing ──► Completed
//!               │               │              │
//!               └───────────────┴──────────────┴──────► Failed(kind)
//! ```
//!
//! Every transition happens on the single task that owns the session, so
//! the state check in [`EncoderSession::apply`] is the only guard needed to
//! keep chunks from landing after finalization.

use std::time::Duration;

use phoneframe_common::clock::{FrameCadence, RecordingClock};
use phoneframe_common::config::{CapabilityClass, ExportDefaults};
use phoneframe_common::error::{ErrorKind, PhoneframeError, PhoneframeResult};
use phoneframe_frame_model::compute_geometry;
use phoneframe_render_engine::{Compositor, RenderTarget, SourceFrameProvider, VideoLayer};

use crate::artifact::OutputArtifact;
use crate::negotiate::{negotiate, CapabilityProbe, NegotiatedCodec};
use crate::pipeline::{
    CaptureSurface, EncoderBackend, EncoderEvent, EncoderEventSender, PipelineStats,
};

/// State of an encoder session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no export requested yet.
    Idle,
    /// Choosing a codec.
    Negotiating,
    /// Frames are being rendered and encoded.
    Recording,
    /// Stop requested; waiting for the encoder to flush.
    Finalizing,
    /// Artifact produced.
    Completed,
    /// Aborted; no artifact will be produced.
    Failed(ErrorKind),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed(_))
    }

    /// Whether the session holds the single active-session slot.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Negotiating | SessionState::Recording | SessionState::Finalizing
        )
    }
}

/// Why recording stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    DurationElapsed,
    Cancelled,
}

/// Inputs that drive the state machine once recording has begun.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Chunk(Vec<u8>),
    StopRequested(StopReason),
    EncoderFlushed,
    EncoderFault(String),
}

impl From<EncoderEvent> for SessionEvent {
    fn from(event: EncoderEvent) -> Self {
        match event {
            EncoderEvent::Chunk(bytes) => SessionEvent::Chunk(bytes),
            EncoderEvent::Flushed => SessionEvent::EncoderFlushed,
            EncoderEvent::Fault(message) => SessionEvent::EncoderFault(message),
        }
    }
}

/// How long a recording runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationPolicy {
    /// Hard cap.
    pub max: Duration,
    /// Used when the source reports no duration.
    pub fallback: Duration,
}

impl Default for DurationPolicy {
    fn default() -> Self {
        Self {
            max: Duration::from_millis(60_000),
            fallback: Duration::from_millis(30_000),
        }
    }
}

impl From<&ExportDefaults> for DurationPolicy {
    fn from(defaults: &ExportDefaults) -> Self {
        Self {
            max: Duration::from_millis(defaults.max_duration_ms),
            fallback: Duration::from_millis(defaults.fallback_duration_ms),
        }
    }
}

impl DurationPolicy {
    /// Recording length for a source of the given duration. A zero
    /// duration is treated as unknown.
    pub fn target_for(&self, source: Option<Duration>) -> Duration {
        source
            .filter(|d| !d.is_zero())
            .unwrap_or(self.fallback)
            .min(self.max)
    }
}

/// One export attempt, from request to artifact (or failure).
pub struct EncoderSession {
    state: SessionState,
    target: RenderTarget,
    target_duration: Duration,
    cadence: FrameCadence,
    codec: Option<NegotiatedCodec>,
    surface: Option<Box<dyn CaptureSurface>>,
    chunks: Vec<Vec<u8>>,
    buffered_bytes: usize,
    clock: Option<RecordingClock>,
    progress: f64,
    frames_rendered: u64,
    recorded: Duration,
    stop_reason: Option<StopReason>,
    last_stats: PipelineStats,
    artifact: Option<OutputArtifact>,
    failure: Option<String>,
}

impl EncoderSession {
    /// Create an idle session that will record for `target_duration`.
    pub fn new(target_duration: Duration, fps: u32) -> PhoneframeResult<Self> {
        if fps == 0 {
            return Err(PhoneframeError::config("Frame rate must be at least 1 fps"));
        }
        Ok(Self {
            state: SessionState::Idle,
            target: RenderTarget::new()?,
            target_duration,
            cadence: FrameCadence::new(fps),
            codec: None,
            surface: None,
            chunks: Vec::new(),
            buffered_bytes: 0,
            clock: None,
            progress: 0.0,
            frames_rendered: 0,
            recorded: Duration::ZERO,
            stop_reason: None,
            last_stats: PipelineStats::default(),
            artifact: None,
            failure: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn target_duration(&self) -> Duration {
        self.target_duration
    }

    pub fn cadence(&self) -> FrameCadence {
        self.cadence
    }

    pub fn codec(&self) -> Option<&NegotiatedCodec> {
        self.codec.as_ref()
    }

    /// Fraction of the target duration recorded so far; never decreases.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Number of chunks waiting to be assembled.
    pub fn buffered_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    /// Time spent recording, frozen once a stop is requested.
    pub fn recorded_duration(&self) -> Duration {
        match (&self.clock, self.state) {
            (Some(clock), SessionState::Recording) => clock.elapsed(),
            _ => self.recorded,
        }
    }

    /// Time since recording started, if it has.
    pub fn elapsed(&self) -> Option<Duration> {
        self.clock.as_ref().map(RecordingClock::elapsed)
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Description of the error that failed the session.
    pub fn failure_message(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    /// Latest capture surface statistics.
    pub fn stats(&self) -> PipelineStats {
        match &self.surface {
            Some(surface) => surface.stats(),
            None => self.last_stats.clone(),
        }
    }

    /// `Idle → Negotiating`. Rejected with `NoSourceLoaded` (state
    /// unchanged) when there is nothing to record.
    pub fn request_export(&mut self, source_loaded: bool) -> PhoneframeResult<()> {
        if self.state != SessionState::Idle {
            return Err(PhoneframeError::SessionBusy);
        }
        if !source_loaded {
            return Err(PhoneframeError::NoSourceLoaded);
        }
        self.transition(SessionState::Negotiating);
        Ok(())
    }

    /// Choose the output codec. Moves to `Failed(NoSupportedCodec)` when
    /// no candidate is supported.
    pub fn negotiate<S: AsRef<str>>(
        &mut self,
        probe: &dyn CapabilityProbe,
        preference: &[S],
        class: CapabilityClass,
    ) -> PhoneframeResult<NegotiatedCodec> {
        self.expect_state(SessionState::Negotiating)?;
        match negotiate(probe, preference, class) {
            Ok(codec) => {
                self.codec = Some(codec.clone());
                Ok(codec)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// `Negotiating → Recording`: open the capture surface for the chosen
    /// codec and start the recording clock.
    pub fn start_recording(
        &mut self,
        backend: &mut dyn EncoderBackend,
        events: EncoderEventSender,
    ) -> PhoneframeResult<()> {
        self.expect_state(SessionState::Negotiating)?;
        let Some(codec) = self.codec.clone() else {
            let e = PhoneframeError::capture_unavailable("No codec negotiated");
            self.fail(&e);
            return Err(e);
        };

        let surface = match backend.open(
            &codec,
            self.cadence.fps(),
            self.target.width(),
            self.target.height(),
            events,
        ) {
            Ok(surface) => surface,
            Err(e) => {
                let e = match e {
                    PhoneframeError::CaptureUnavailable { .. } => e,
                    other => PhoneframeError::capture_unavailable(other.to_string()),
                };
                self.fail(&e);
                return Err(e);
            }
        };

        let clock = RecordingClock::start();
        tracing::info!(
            backend = backend.name(),
            mime = %codec.mime,
            fps = self.cadence.fps(),
            target_ms = self.target_duration.as_millis() as u64,
            started_at = clock.epoch_wall(),
            "Capture surface opened"
        );
        self.surface = Some(surface);
        self.clock = Some(clock);
        self.transition(SessionState::Recording);
        Ok(())
    }

    /// Render one frame and push it into the capture surface. Does
    /// nothing unless recording.
    pub fn tick(
        &mut self,
        compositor: &mut Compositor,
        source: Option<&mut dyn SourceFrameProvider>,
    ) -> Option<VideoLayer> {
        if self.state != SessionState::Recording {
            return None;
        }
        let elapsed = self.elapsed().unwrap_or_default();

        let geometry = compute_geometry(elapsed.as_secs_f64());
        let layer = compositor.render_frame(&mut self.target, &geometry, source);
        self.frames_rendered += 1;

        let pushed = match self.surface.as_mut() {
            Some(surface) => surface.push_frame(&self.target, elapsed),
            None => Err(PhoneframeError::encoder_fault("Capture surface missing")),
        };
        if let Err(e) = pushed {
            let e = match e {
                PhoneframeError::EncoderFault { .. } => e,
                other => PhoneframeError::encoder_fault(other.to_string()),
            };
            self.fail(&e);
            return Some(layer);
        }

        self.update_progress(elapsed);
        Some(layer)
    }

    /// Apply an event. Events that make no sense in the current state are
    /// ignored.
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Chunk(bytes) => self.accept_chunk(bytes),
            SessionEvent::StopRequested(reason) => self.request_stop(reason),
            SessionEvent::EncoderFlushed => match self.state {
                SessionState::Finalizing => self.complete(),
                SessionState::Recording => {
                    self.fail(&PhoneframeError::encoder_fault(
                        "Encoder finished before a stop was requested",
                    ));
                }
                _ => {
                    tracing::trace!(state = ?self.state, "Ignoring encoder flush");
                }
            },
            SessionEvent::EncoderFault(message) => {
                if self.state.is_terminal() {
                    tracing::debug!(%message, "Ignoring encoder fault after session ended");
                } else {
                    self.fail(&PhoneframeError::encoder_fault(message));
                }
            }
        }
    }

    /// Abort with `error` from any non-terminal state.
    pub fn fail(&mut self, error: &PhoneframeError) {
        if self.state.is_terminal() {
            return;
        }
        let kind = error.kind();
        tracing::error!(kind = %kind, error = %error, state = ?self.state, "Export session failed");
        if let Some(clock) = &self.clock {
            if self.state == SessionState::Recording {
                self.recorded = clock.elapsed();
            }
        }
        self.release();
        self.chunks.clear();
        self.buffered_bytes = 0;
        self.failure = Some(error.to_string());
        self.transition(SessionState::Failed(kind));
    }

    /// Take the finished artifact. Yields it at most once.
    pub fn take_artifact(&mut self) -> Option<OutputArtifact> {
        self.artifact.take()
    }

    fn accept_chunk(&mut self, bytes: Vec<u8>) {
        match self.state {
            SessionState::Recording | SessionState::Finalizing => {
                if bytes.is_empty() {
                    return;
                }
                self.buffered_bytes += bytes.len();
                self.chunks.push(bytes);
                tracing::trace!(
                    chunks = self.chunks.len(),
                    bytes = self.buffered_bytes,
                    "Buffered encoder chunk"
                );
            }
            _ => {
                tracing::debug!(state = ?self.state, len = bytes.len(), "Dropping late chunk");
            }
        }
    }

    fn request_stop(&mut self, reason: StopReason) {
        if self.state != SessionState::Recording {
            tracing::debug!(state = ?self.state, ?reason, "Stop request ignored");
            return;
        }

        self.recorded = self.elapsed().unwrap_or_default();
        self.stop_reason = Some(reason);
        self.transition(SessionState::Finalizing);
        tracing::info!(
            ?reason,
            recorded_ms = self.recorded.as_millis() as u64,
            frames = self.frames_rendered,
            "Recording stopped"
        );

        let stopped = match self.surface.as_mut() {
            Some(surface) => surface.request_stop(),
            None => Err(PhoneframeError::encoder_fault("Capture surface missing")),
        };
        if let Err(e) = stopped {
            let e = match e {
                PhoneframeError::EncoderFault { .. } => e,
                other => PhoneframeError::encoder_fault(other.to_string()),
            };
            self.fail(&e);
        }
    }

    fn complete(&mut self) {
        let Some(codec) = self.codec.as_ref() else {
            self.fail(&PhoneframeError::encoder_fault("No codec negotiated"));
            return;
        };
        let chunks = std::mem::take(&mut self.chunks);
        let chunk_count = chunks.len();
        let artifact = OutputArtifact::from_chunks(chunks, codec);
        self.buffered_bytes = 0;
        self.release();

        tracing::info!(
            bytes = artifact.len(),
            chunks = chunk_count,
            mime = artifact.mime(),
            "Recording finalized"
        );
        self.artifact = Some(artifact);
        self.transition(SessionState::Completed);
    }

    fn release(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            self.last_stats = surface.stats();
            surface.release();
            tracing::debug!(
                frames = self.last_stats.frames_captured,
                dropped = self.last_stats.frames_dropped,
                "Capture surface released"
            );
        }
    }

    fn update_progress(&mut self, elapsed: Duration) {
        let fraction = if self.target_duration.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f64() / self.target_duration.as_secs_f64()).min(1.0)
        };
        self.progress = self.progress.max(fraction);
    }

    fn expect_state(&self, expected: SessionState) -> PhoneframeResult<()> {
        if self.state == expected {
            return Ok(());
        }
        Err(PhoneframeError::Other(anyhow::anyhow!(
            "Session is {:?}, expected {expected:?}",
            self.state
        )))
    }

    fn transition(&mut self, next: SessionState) {
        tracing::info!(from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        self.release();
    }
}
