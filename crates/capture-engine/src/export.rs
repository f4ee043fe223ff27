//! Render loop driver.
//!
//! One task owns the session, the render target and the compositor and
//! multiplexes four inputs: frame ticks, the duration timer, cancellation
//! and encoder events. Nothing else ever touches session state.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use phoneframe_common::config::{CapabilityClass, ExportDefaults};
use phoneframe_common::error::{ErrorKind, PhoneframeError, PhoneframeResult};
use phoneframe_frame_model::FitPolicy;
use phoneframe_render_engine::{Compositor, CompositorOptions, SourceFrameProvider, VideoLayer};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};

use crate::artifact::DownloadSink;
use crate::negotiate::{CapabilityProbe, Container, CODEC_PREFERENCE};
use crate::pipeline::{EncoderBackend, PipelineStats};
use crate::session::{DurationPolicy, EncoderSession, SessionEvent, SessionState, StopReason};

/// How long to wait for the encoder to flush after a stop request.
pub const FINALIZE_TIMEOUT: Duration = Duration::from_secs(10);

/// Progress callback for exports.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// Export progress report.
#[derive(Debug, Clone)]
pub struct ExportProgress {
    /// Fraction of the target duration recorded, in [0.0, 1.0].
    pub progress: f64,

    /// Frames rendered so far.
    pub frames_rendered: u64,

    /// Time since recording started.
    pub elapsed: Duration,

    /// Length the recording will have when it runs to completion.
    pub target_duration: Duration,

    /// Current stage.
    pub stage: ExportStage,
}

/// Stages of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Recording,
    Finalizing,
    Complete,
    Failed,
}

/// Settings for one export.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub fps: u32,
    pub capability_class: CapabilityClass,
    pub duration: DurationPolicy,
    /// Codec candidates, most preferred first.
    pub preference: Vec<String>,
    /// Delivered filename without extension.
    pub filename_base: String,
    pub compositor: CompositorOptions,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::from(&ExportDefaults::default())
    }
}

impl From<&ExportDefaults> for ExportSettings {
    fn from(defaults: &ExportDefaults) -> Self {
        Self {
            fps: defaults.fps,
            capability_class: defaults.capability_class,
            duration: DurationPolicy::from(defaults),
            preference: CODEC_PREFERENCE.iter().map(|m| m.to_string()).collect(),
            filename_base: defaults.filename_base.clone(),
            compositor: CompositorOptions {
                fit_policy: defaults.fit_policy,
                brand_text: defaults.brand_text.clone(),
                font_path: defaults.font_path.clone(),
            },
        }
    }
}

/// Summary of a delivered export.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub path: PathBuf,
    pub mime: String,
    pub container: Container,
    pub bytes: usize,
    pub frames_rendered: u64,
    pub recorded: Duration,
    pub target_duration: Duration,
    pub stop_reason: StopReason,
    pub read_failures: u64,
    pub stats: PipelineStats,
}

/// Enforces the single-active-session rule.
///
/// Cloned handles share one slot; a second export started while the slot
/// is held is rejected with `SessionBusy` instead of being queued.
#[derive(Debug, Clone, Default)]
pub struct ExportCoordinator {
    active: Arc<AtomicBool>,
}

impl ExportCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot. Released when the guard drops.
    pub fn try_begin(&self) -> PhoneframeResult<SessionGuard> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PhoneframeError::SessionBusy)?;
        Ok(SessionGuard {
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Holds the active-session slot.
#[derive(Debug)]
pub struct SessionGuard {
    active: Arc<AtomicBool>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Requests that a running export stop early.
///
/// Safe to call any number of times from anywhere. Only a recording
/// session reacts; requests made before recording starts or after it
/// ends have no effect.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_modify(|n| *n = n.wrapping_add(1));
        tracing::debug!("Cancellation requested");
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

/// Runs exports against injected collaborators.
pub struct ExportDriver {
    settings: ExportSettings,
    probe: Arc<dyn CapabilityProbe + Send + Sync>,
    backend: Box<dyn EncoderBackend>,
    sink: Arc<dyn DownloadSink>,
    coordinator: ExportCoordinator,
}

impl ExportDriver {
    pub fn new(
        settings: ExportSettings,
        probe: Arc<dyn CapabilityProbe + Send + Sync>,
        backend: Box<dyn EncoderBackend>,
        sink: Arc<dyn DownloadSink>,
    ) -> Self {
        Self {
            settings,
            probe,
            backend,
            sink,
            coordinator: ExportCoordinator::new(),
        }
    }

    /// Share an active-session slot with other drivers.
    pub fn with_coordinator(mut self, coordinator: ExportCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn coordinator(&self) -> &ExportCoordinator {
        &self.coordinator
    }

    /// Record `source` inside the phone frame and deliver the result.
    ///
    /// The encoder is started before playback is restarted from zero, so
    /// the first rendered frame already lands in the recording.
    pub async fn run(
        &mut self,
        source: Option<&mut dyn SourceFrameProvider>,
        cancel: &CancelHandle,
        progress: Option<ProgressCallback>,
    ) -> PhoneframeResult<ExportReport> {
        let _guard = self.coordinator.try_begin()?;
        let source = source.ok_or(PhoneframeError::NoSourceLoaded)?;

        let target_duration = self.settings.duration.target_for(source.duration());
        report(
            &progress,
            ExportProgress {
                progress: 0.0,
                frames_rendered: 0,
                elapsed: Duration::ZERO,
                target_duration,
                stage: ExportStage::Preparing,
            },
        );
        let (width, height) = source.natural_size();
        tracing::info!(
            source_width = width,
            source_height = height,
            source_ms = source.duration().map(|d| d.as_millis() as u64),
            target_ms = target_duration.as_millis() as u64,
            fps = self.settings.fps,
            "Starting export"
        );

        let mut compositor = Compositor::new(&self.settings.compositor)?;
        let mut session = EncoderSession::new(target_duration, self.settings.fps)?;
        session.request_export(true)?;

        if let Err(e) = self
            .record(&mut session, &mut compositor, source, cancel, &progress)
            .await
        {
            session.fail(&e);
            report(&progress, stage_report(&session, ExportStage::Failed));
            return Err(e);
        }

        let Some(artifact) = session.take_artifact() else {
            let e = PhoneframeError::encoder_fault("Session completed without an artifact");
            report(&progress, stage_report(&session, ExportStage::Failed));
            return Err(e);
        };
        let stop_reason = session.stop_reason().unwrap_or(StopReason::DurationElapsed);

        let filename = artifact.suggested_filename(&self.settings.filename_base);
        let mime = artifact.mime().to_string();
        let container = artifact.container();
        let bytes = artifact.len();
        let path = self.sink.deliver(artifact, &filename).await?;

        report(&progress, stage_report(&session, ExportStage::Complete));

        Ok(ExportReport {
            path,
            mime,
            container,
            bytes,
            frames_rendered: session.frames_rendered(),
            recorded: session.recorded_duration(),
            target_duration,
            stop_reason,
            read_failures: compositor.read_failures(),
            stats: session.stats(),
        })
    }

    /// Drive `session` from `Negotiating` to a terminal state. Returns an
    /// error exactly when the session did not complete.
    async fn record(
        &mut self,
        session: &mut EncoderSession,
        compositor: &mut Compositor,
        source: &mut dyn SourceFrameProvider,
        cancel: &CancelHandle,
        progress: &Option<ProgressCallback>,
    ) -> PhoneframeResult<()> {
        session.negotiate(
            self.probe.as_ref(),
            &self.settings.preference,
            self.settings.capability_class,
        )?;

        let (events_tx, mut events) = mpsc::unbounded_channel();
        session.start_recording(self.backend.as_mut(), events_tx)?;
        source.play_from_start()?;

        let mut cancel_rx = cancel.subscribe();
        let mut cancel_open = true;
        let deadline = sleep(session.target_duration());
        tokio::pin!(deadline);
        let mut deadline_armed = true;
        let finalize_deadline = sleep(Duration::MAX);
        tokio::pin!(finalize_deadline);
        let mut finalize_armed = false;

        let mut ticker = interval(session.cadence().interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !session.is_terminal() {
            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Some(event) => session.apply(SessionEvent::from(event)),
                    None => session.apply(SessionEvent::EncoderFault(
                        "Encoder event channel closed".to_string(),
                    )),
                },

                changed = cancel_rx.changed(), if cancel_open => {
                    match changed {
                        Ok(()) => session.apply(SessionEvent::StopRequested(StopReason::Cancelled)),
                        Err(_) => cancel_open = false,
                    }
                }

                _ = &mut deadline, if deadline_armed => {
                    deadline_armed = false;
                    session.apply(SessionEvent::StopRequested(StopReason::DurationElapsed));
                }

                _ = &mut finalize_deadline, if finalize_armed => {
                    finalize_armed = false;
                    session.apply(SessionEvent::EncoderFault(format!(
                        "Encoder did not flush within {}s",
                        FINALIZE_TIMEOUT.as_secs()
                    )));
                }

                _ = ticker.tick(), if session.state() == SessionState::Recording => {
                    if session.tick(compositor, Some(&mut *source)) == Some(VideoLayer::ReadFailed) {
                        tracing::debug!(frame = session.frames_rendered(), "Rendered frame without video");
                    }
                    report(progress, stage_report(session, ExportStage::Recording));
                }
            }

            if session.state() == SessionState::Finalizing && !finalize_armed {
                finalize_armed = true;
                deadline_armed = false;
                finalize_deadline
                    .as_mut()
                    .reset(tokio::time::Instant::now() + FINALIZE_TIMEOUT);
                report(progress, stage_report(session, ExportStage::Finalizing));
            }
        }

        match session.state() {
            SessionState::Completed => Ok(()),
            SessionState::Failed(kind) => Err(failure_for(
                kind,
                session.failure_message().unwrap_or("Export aborted"),
                &self.settings.preference,
            )),
            other => Err(PhoneframeError::encoder_fault(format!(
                "Export loop ended in state {other:?}"
            ))),
        }
    }
}

/// Rebuild the error for a session that failed on an event. The original
/// cause has already been logged by the session.
fn failure_for(kind: ErrorKind, message: &str, preference: &[String]) -> PhoneframeError {
    match kind {
        ErrorKind::NoSourceLoaded => PhoneframeError::NoSourceLoaded,
        ErrorKind::SessionBusy => PhoneframeError::SessionBusy,
        ErrorKind::NoSupportedCodec => PhoneframeError::NoSupportedCodec {
            candidates: preference.to_vec(),
        },
        ErrorKind::CaptureUnavailable => PhoneframeError::capture_unavailable(message),
        ErrorKind::TransientFrameRead => PhoneframeError::transient_frame_read(message),
        ErrorKind::EncoderFault | ErrorKind::Internal => PhoneframeError::encoder_fault(message),
    }
}

fn stage_report(session: &EncoderSession, stage: ExportStage) -> ExportProgress {
    ExportProgress {
        progress: session.progress(),
        frames_rendered: session.frames_rendered(),
        elapsed: session.recorded_duration(),
        target_duration: session.target_duration(),
        stage,
    }
}

fn report(progress: &Option<ProgressCallback>, update: ExportProgress) {
    if let Some(cb) = progress {
        cb(update);
    }
}

/// Convenience for callers holding a fit policy from the command line.
pub fn settings_with_fit(defaults: &ExportDefaults, fit: Option<FitPolicy>) -> ExportSettings {
    let mut settings = ExportSettings::from(defaults);
    if let Some(fit) = fit {
        settings.compositor.fit_policy = fit;
    }
    settings
}
