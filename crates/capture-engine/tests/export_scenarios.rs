//! End-to-end export scenarios against in-memory collaborators.
//!
//! Runs on a paused tokio clock, so a ten second recording completes as
//! fast as the frames can be composited.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use phoneframe_capture_engine::{
    CancelHandle, CapabilityProbe, CaptureSurface, Container, DownloadSink, DurationPolicy,
    EncoderBackend, EncoderEvent, EncoderEventSender, ExportCoordinator, ExportDriver,
    ExportProgress, ExportSettings, ExportStage, NegotiatedCodec, OutputArtifact,
    PipelineStats, ProgressCallback, StopReason,
};
use phoneframe_common::error::{ErrorKind, PhoneframeError, PhoneframeResult};
use phoneframe_render_engine::{RenderTarget, SourceFrameProvider, VideoFrame};

/// Marks the chunk the fake encoder emits while flushing.
const TRAILER: u64 = u64::MAX;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct FakeSource {
    width: u32,
    height: u32,
    duration: Option<Duration>,
    pixels: Vec<u8>,
    plays: usize,
    reads: u64,
    fail_every: Option<u64>,
}

impl FakeSource {
    fn new(width: u32, height: u32, duration: Option<Duration>) -> Self {
        Self {
            width,
            height,
            duration,
            pixels: [40u8, 90, 200, 255].repeat((width * height) as usize),
            plays: 0,
            reads: 0,
            fail_every: None,
        }
    }
}

impl SourceFrameProvider for FakeSource {
    fn natural_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn position(&self) -> Duration {
        Duration::ZERO
    }

    fn is_frame_ready(&self) -> bool {
        self.plays > 0
    }

    fn read_frame(&mut self) -> PhoneframeResult<VideoFrame<'_>> {
        self.reads += 1;
        if let Some(n) = self.fail_every {
            if self.reads % n == 0 {
                return Err(PhoneframeError::transient_frame_read("simulated decode hiccup"));
            }
        }
        VideoFrame::new(self.width, self.height, &self.pixels)
    }

    fn play_from_start(&mut self) -> PhoneframeResult<()> {
        self.plays += 1;
        Ok(())
    }
}

struct FakeProbe {
    supported: Vec<&'static str>,
}

impl CapabilityProbe for FakeProbe {
    fn is_supported(&self, mime: &str) -> bool {
        self.supported.iter().any(|m| *m == mime)
    }
}

#[derive(Default)]
struct BackendLog {
    opens: AtomicUsize,
    pushes: AtomicU64,
    releases: AtomicUsize,
}

#[derive(Clone, Copy, PartialEq)]
enum EncoderBehavior {
    Normal,
    FaultAfter(u64),
    NeverFlush,
}

struct FakeBackend {
    log: Arc<BackendLog>,
    behavior: EncoderBehavior,
}

impl FakeBackend {
    fn new(behavior: EncoderBehavior) -> (Self, Arc<BackendLog>) {
        let log = Arc::new(BackendLog::default());
        (
            Self {
                log: Arc::clone(&log),
                behavior,
            },
            log,
        )
    }
}

impl EncoderBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn open(
        &mut self,
        _codec: &NegotiatedCodec,
        _fps: u32,
        width: u32,
        height: u32,
        events: EncoderEventSender,
    ) -> PhoneframeResult<Box<dyn CaptureSurface>> {
        assert_eq!((width, height), (2400, 1800));
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSurface {
            events,
            log: Arc::clone(&self.log),
            behavior: self.behavior,
            frames: 0,
        }))
    }
}

/// Emits one chunk per frame holding the frame timestamp in milliseconds.
struct FakeSurface {
    events: EncoderEventSender,
    log: Arc<BackendLog>,
    behavior: EncoderBehavior,
    frames: u64,
}

impl CaptureSurface for FakeSurface {
    fn push_frame(&mut self, target: &RenderTarget, timestamp: Duration) -> PhoneframeResult<()> {
        assert_eq!((target.width(), target.height()), (2400, 1800));
        self.frames += 1;
        self.log.pushes.fetch_add(1, Ordering::SeqCst);
        let ms = timestamp.as_millis() as u64;
        let _ = self.events.send(EncoderEvent::Chunk(ms.to_le_bytes().to_vec()));
        if self.behavior == EncoderBehavior::FaultAfter(self.frames) {
            let _ = self
                .events
                .send(EncoderEvent::Fault("simulated encoder crash".into()));
        }
        Ok(())
    }

    fn request_stop(&mut self) -> PhoneframeResult<()> {
        if self.behavior != EncoderBehavior::NeverFlush {
            let _ = self
                .events
                .send(EncoderEvent::Chunk(TRAILER.to_le_bytes().to_vec()));
            let _ = self.events.send(EncoderEvent::Flushed);
        }
        Ok(())
    }

    fn release(&mut self) {
        self.log.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn stats(&self) -> PipelineStats {
        PipelineStats {
            frames_captured: self.frames,
            ..PipelineStats::default()
        }
    }
}

#[derive(Default)]
struct MemorySink {
    delivered: Mutex<Vec<(String, OutputArtifact)>>,
}

#[async_trait]
impl DownloadSink for MemorySink {
    async fn deliver(&self, artifact: OutputArtifact, filename: &str) -> PhoneframeResult<PathBuf> {
        self.delivered
            .lock()
            .unwrap()
            .push((filename.to_string(), artifact));
        Ok(PathBuf::from("/downloads").join(filename))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn settings(fps: u32) -> ExportSettings {
    let mut settings = ExportSettings::default();
    settings.fps = fps;
    settings.compositor.brand_text = String::new();
    settings
}

struct Harness {
    driver: ExportDriver,
    log: Arc<BackendLog>,
    sink: Arc<MemorySink>,
}

fn harness(fps: u32, supported: Vec<&'static str>, behavior: EncoderBehavior) -> Harness {
    let (backend, log) = FakeBackend::new(behavior);
    let sink = Arc::new(MemorySink::default());
    let driver = ExportDriver::new(
        settings(fps),
        Arc::new(FakeProbe { supported }),
        Box::new(backend),
        Arc::clone(&sink) as Arc<dyn DownloadSink>,
    );
    Harness { driver, log, sink }
}

/// Frame timestamps carried by the artifact, without the flush trailer.
fn timestamps(artifact: &OutputArtifact) -> Vec<u64> {
    artifact
        .bytes()
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .filter(|&ms| ms != TRAILER)
        .collect()
}

fn within(actual: Duration, expected: Duration, tolerance: Duration) -> bool {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    diff <= tolerance
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn full_length_recording_completes() {
    let mut h = harness(10, vec!["video/webm"], EncoderBehavior::Normal);
    let mut source = FakeSource::new(1920, 1080, Some(Duration::from_millis(10_000)));
    let cancel = CancelHandle::new();

    let updates: Arc<Mutex<Vec<ExportProgress>>> = Arc::default();
    let sink_updates = Arc::clone(&updates);
    let progress: ProgressCallback = Box::new(move |p: ExportProgress| sink_updates.lock().unwrap().push(p));

    let report = h
        .driver
        .run(Some(&mut source), &cancel, Some(progress))
        .await
        .unwrap();

    let interval = Duration::from_millis(100);
    assert_eq!(report.stop_reason, StopReason::DurationElapsed);
    assert_eq!(report.target_duration, Duration::from_secs(10));
    assert!(within(report.recorded, Duration::from_secs(10), interval));
    assert_eq!(report.container, Container::Webm);
    assert_eq!(report.path, PathBuf::from("/downloads/phone-frame-4x3.webm"));
    assert_eq!(source.plays, 1);

    let delivered = h.sink.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    let (filename, artifact) = &delivered[0];
    assert_eq!(filename, "phone-frame-4x3.webm");
    assert!(!artifact.is_empty());
    assert_eq!(artifact.len(), report.bytes);

    let stamps = timestamps(artifact);
    // The encoder is already running when playback starts, so the very
    // first rendered frame is part of the recording.
    assert_eq!(stamps[0], 0);
    let last = Duration::from_millis(*stamps.last().unwrap());
    assert!(within(last, Duration::from_secs(10), interval));
    assert!((99..=101).contains(&stamps.len()), "frames: {}", stamps.len());

    assert_eq!(h.log.opens.load(Ordering::SeqCst), 1);
    assert_eq!(h.log.releases.load(Ordering::SeqCst), 1);
    assert!(!h.driver.coordinator().is_active());

    let updates = updates.lock().unwrap();
    assert_eq!(updates.first().unwrap().stage, ExportStage::Preparing);
    assert_eq!(updates.last().unwrap().stage, ExportStage::Complete);
    assert!(updates
        .windows(2)
        .all(|w| w[0].progress <= w[1].progress));
    assert!(updates.iter().all(|u| (0.0..=1.0).contains(&u.progress)));
}

#[tokio::test(start_paused = true)]
async fn unsupported_environment_fails_before_capture() {
    let mut h = harness(10, vec![], EncoderBehavior::Normal);
    let mut source = FakeSource::new(1920, 1080, Some(Duration::from_secs(10)));
    let cancel = CancelHandle::new();

    let err = h
        .driver
        .run(Some(&mut source), &cancel, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoSupportedCodec);
    assert_eq!(h.log.opens.load(Ordering::SeqCst), 0);
    assert_eq!(h.log.pushes.load(Ordering::SeqCst), 0);
    assert!(h.sink.delivered.lock().unwrap().is_empty());
    // Playback is never restarted for a session that cannot record.
    assert_eq!(source.plays, 0);
    assert!(!h.driver.coordinator().is_active());
}

#[tokio::test(start_paused = true)]
async fn cancellation_completes_with_partial_recording() {
    let mut h = harness(10, vec!["video/mp4"], EncoderBehavior::Normal);
    let mut source = FakeSource::new(192, 108, Some(Duration::from_secs(10)));
    let cancel = CancelHandle::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        canceller.cancel();
    });

    let report = h
        .driver
        .run(Some(&mut source), &cancel, None)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert!(within(
        report.recorded,
        Duration::from_secs(2),
        Duration::from_millis(100)
    ));

    {
        let delivered = h.sink.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        let stamps = timestamps(&delivered[0].1);
        assert!((20..=22).contains(&stamps.len()), "frames: {}", stamps.len());
        assert_eq!(delivered[0].0, "phone-frame-4x3.mp4");
    }

    // A second cancellation after completion changes nothing.
    cancel.cancel();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.sink.delivered.lock().unwrap().len(), 1);
    assert_eq!(h.log.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_before_export_is_ignored() {
    let mut h = harness(10, vec!["video/mp4"], EncoderBehavior::Normal);
    let mut source = FakeSource::new(192, 108, Some(Duration::from_secs(1)));
    let cancel = CancelHandle::new();
    cancel.cancel();

    let report = h
        .driver
        .run(Some(&mut source), &cancel, None)
        .await
        .unwrap();
    assert_eq!(report.stop_reason, StopReason::DurationElapsed);
    assert_eq!(report.recorded, Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn chunk_order_is_preserved() {
    let mut h = harness(10, vec!["video/mp4"], EncoderBehavior::Normal);
    let mut source = FakeSource::new(192, 108, Some(Duration::from_secs(3)));
    let cancel = CancelHandle::new();

    h.driver
        .run(Some(&mut source), &cancel, None)
        .await
        .unwrap();

    let delivered = h.sink.delivered.lock().unwrap();
    let artifact = &delivered[0].1;
    let stamps = timestamps(artifact);
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    // The chunk emitted while flushing is kept, and it comes last.
    assert_eq!(&artifact.bytes()[artifact.len() - 8..], &TRAILER.to_le_bytes());
}

#[tokio::test(start_paused = true)]
async fn second_preference_is_used_when_first_unsupported() {
    let mut h = harness(10, vec!["video/webm;codecs=vp9", "video/webm"], EncoderBehavior::Normal);
    let mut source = FakeSource::new(192, 108, Some(Duration::from_secs(1)));
    let cancel = CancelHandle::new();

    let report = h
        .driver
        .run(Some(&mut source), &cancel, None)
        .await
        .unwrap();
    assert_eq!(report.mime, "video/webm;codecs=vp9");
    assert_eq!(report.container, Container::Webm);
}

#[tokio::test(start_paused = true)]
async fn long_source_is_capped_at_sixty_seconds() {
    let mut h = harness(1, vec!["video/mp4"], EncoderBehavior::Normal);
    let mut source = FakeSource::new(64, 36, Some(Duration::from_millis(120_000)));
    let cancel = CancelHandle::new();

    let report = h
        .driver
        .run(Some(&mut source), &cancel, None)
        .await
        .unwrap();
    assert_eq!(report.target_duration, Duration::from_millis(60_000));
    assert_eq!(report.recorded, Duration::from_millis(60_000));
}

#[tokio::test(start_paused = true)]
async fn unknown_duration_records_thirty_seconds() {
    let mut h = harness(1, vec!["video/mp4"], EncoderBehavior::Normal);
    let mut source = FakeSource::new(64, 36, None);
    let cancel = CancelHandle::new();

    let report = h
        .driver
        .run(Some(&mut source), &cancel, None)
        .await
        .unwrap();
    assert_eq!(report.target_duration, Duration::from_millis(30_000));
    assert_eq!(report.recorded, Duration::from_millis(30_000));
}

#[test]
fn duration_policy_matches_cap() {
    let policy = DurationPolicy::default();
    assert_eq!(
        policy.target_for(Some(Duration::from_millis(120_000))),
        Duration::from_millis(60_000)
    );
    assert_eq!(policy.target_for(None), Duration::from_millis(30_000));
}

#[tokio::test(start_paused = true)]
async fn concurrent_export_is_rejected() {
    let coordinator = ExportCoordinator::new();
    let active = coordinator.try_begin().unwrap();

    let h = harness(10, vec!["video/mp4"], EncoderBehavior::Normal);
    let mut driver = h.driver.with_coordinator(coordinator.clone());
    let mut source = FakeSource::new(192, 108, Some(Duration::from_secs(1)));
    let cancel = CancelHandle::new();

    let err = driver
        .run(Some(&mut source), &cancel, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionBusy);

    // Busy wins over a missing source.
    let err = driver.run(None, &cancel, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionBusy);

    // The active session keeps its slot.
    assert!(coordinator.is_active());
    assert_eq!(h.log.opens.load(Ordering::SeqCst), 0);
    assert_eq!(source.plays, 0);

    drop(active);
    driver
        .run(Some(&mut source), &cancel, None)
        .await
        .unwrap();
    assert!(!coordinator.is_active());
}

#[tokio::test(start_paused = true)]
async fn export_without_source_is_rejected() {
    let mut h = harness(10, vec!["video/mp4"], EncoderBehavior::Normal);
    let cancel = CancelHandle::new();

    let err = h.driver.run(None, &cancel, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSourceLoaded);
    assert_eq!(h.log.opens.load(Ordering::SeqCst), 0);
    assert!(!h.driver.coordinator().is_active());
}

#[tokio::test(start_paused = true)]
async fn encoder_fault_fails_without_artifact() {
    let mut h = harness(10, vec!["video/mp4"], EncoderBehavior::FaultAfter(5));
    let mut source = FakeSource::new(192, 108, Some(Duration::from_secs(10)));
    let cancel = CancelHandle::new();

    let updates: Arc<Mutex<Vec<ExportStage>>> = Arc::default();
    let sink_updates = Arc::clone(&updates);
    let progress: ProgressCallback = Box::new(move |p: ExportProgress| sink_updates.lock().unwrap().push(p.stage));

    let err = h
        .driver
        .run(Some(&mut source), &cancel, Some(progress))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::EncoderFault);
    assert!(err.to_string().contains("simulated encoder crash"));
    assert!(h.sink.delivered.lock().unwrap().is_empty());
    assert_eq!(h.log.releases.load(Ordering::SeqCst), 1);
    assert_eq!(h.log.pushes.load(Ordering::SeqCst), 5);
    assert_eq!(updates.lock().unwrap().last(), Some(&ExportStage::Failed));
    assert!(!h.driver.coordinator().is_active());
}

#[tokio::test(start_paused = true)]
async fn missing_flush_times_out() {
    let mut h = harness(10, vec!["video/mp4"], EncoderBehavior::NeverFlush);
    let mut source = FakeSource::new(192, 108, Some(Duration::from_secs(1)));
    let cancel = CancelHandle::new();

    let err = h
        .driver
        .run(Some(&mut source), &cancel, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncoderFault);
    assert!(h.sink.delivered.lock().unwrap().is_empty());
    assert_eq!(h.log.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_read_failures_do_not_abort() {
    let mut h = harness(10, vec!["video/mp4"], EncoderBehavior::Normal);
    let mut source = FakeSource::new(192, 108, Some(Duration::from_secs(2)));
    source.fail_every = Some(3);
    let cancel = CancelHandle::new();

    let report = h
        .driver
        .run(Some(&mut source), &cancel, None)
        .await
        .unwrap();
    assert!(report.read_failures > 0);
    assert_eq!(report.stop_reason, StopReason::DurationElapsed);
    assert_eq!(h.sink.delivered.lock().unwrap().len(), 1);
}
