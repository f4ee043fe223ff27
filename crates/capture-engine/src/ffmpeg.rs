//! ffmpeg-backed capability probe and encoder.
//!
//! Rendered frames are piped into `ffmpeg` as raw RGBA on stdin and the
//! encoded stream is read back from stdout in chunks. The muxers are set up
//! for streaming output so that chunks are valid to concatenate.

use std::collections::BTreeSet;
use std::io::{BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use phoneframe_common::clock::FrameCadence;
use phoneframe_common::error::{PhoneframeError, PhoneframeResult};
use phoneframe_render_engine::RenderTarget;

use crate::negotiate::{CapabilityProbe, Container, NegotiatedCodec};
use crate::pipeline::{
    CaptureSurface, EncoderBackend, EncoderEvent, EncoderEventSender, PipelineStats,
};

/// Size of the reads from ffmpeg's stdout.
const CHUNK_SIZE: usize = 64 * 1024;

/// Rendered frames waiting for the encoder. Beyond this, frames are dropped
/// and the gap is filled by repeating the next accepted frame.
const FRAME_QUEUE_DEPTH: usize = 4;

/// Whether `binary` can be found on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Encoder availability as reported by `ffmpeg -encoders`.
#[derive(Debug, Clone, Default)]
pub struct FfmpegCapabilityProbe {
    encoders: BTreeSet<String>,
}

impl FfmpegCapabilityProbe {
    /// Ask the local ffmpeg which encoders it has.
    pub fn detect() -> PhoneframeResult<Self> {
        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-encoders"])
            .output()
            .map_err(|e| {
                PhoneframeError::capture_unavailable(format!("Failed to run ffmpeg: {e}"))
            })?;
        if !output.status.success() {
            return Err(PhoneframeError::capture_unavailable(format!(
                "ffmpeg -encoders failed (status {}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let probe = Self::from_encoder_list(&String::from_utf8_lossy(&output.stdout));
        tracing::debug!(encoders = probe.encoders.len(), "Detected ffmpeg encoders");
        Ok(probe)
    }

    /// Parse the listing printed by `ffmpeg -encoders`.
    pub fn from_encoder_list(listing: &str) -> Self {
        let mut encoders = BTreeSet::new();
        let mut in_table = false;
        for line in listing.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("------") {
                in_table = true;
                continue;
            }
            if !in_table {
                continue;
            }
            let mut fields = trimmed.split_whitespace();
            let (Some(flags), Some(name)) = (fields.next(), fields.next()) else {
                continue;
            };
            if flags.starts_with('V') {
                encoders.insert(name.to_string());
            }
        }
        Self { encoders }
    }

    pub fn has_encoder(&self, name: &str) -> bool {
        self.encoders.contains(name)
    }

    /// The ffmpeg encoder used for a mime candidate, if any.
    pub fn encoder_for(&self, mime: &str) -> Option<String> {
        let mime = mime.to_ascii_lowercase().replace(' ', "");
        let (base, codecs) = match mime.split_once(';') {
            Some((base, params)) => (
                base.to_string(),
                params.strip_prefix("codecs=").map(str::to_string),
            ),
            None => (mime.clone(), None),
        };

        let candidates: Vec<String> = match (base.as_str(), codecs.as_deref()) {
            ("video/mp4", None) | ("video/mp4", Some("avc1")) | ("video/mp4", Some("h264")) => {
                let mut list = vec!["libx264".to_string(), "libopenh264".to_string()];
                list.extend(
                    self.encoders
                        .iter()
                        .filter(|e| e.starts_with("h264_"))
                        .cloned(),
                );
                list
            }
            ("video/webm", Some("vp9")) => vec!["libvpx-vp9".to_string()],
            ("video/webm", Some("vp8")) => vec!["libvpx".to_string()],
            ("video/webm", None) => vec!["libvpx-vp9".to_string(), "libvpx".to_string()],
            _ => Vec::new(),
        };

        candidates.into_iter().find(|e| self.has_encoder(e))
    }
}

impl CapabilityProbe for FfmpegCapabilityProbe {
    fn is_supported(&self, mime: &str) -> bool {
        self.encoder_for(mime).is_some()
    }
}

/// Output-side ffmpeg arguments for `encoder` writing `codec` to stdout.
pub fn encoder_args(encoder: &str, codec: &NegotiatedCodec, fps: u32) -> Vec<String> {
    let bitrate = codec.bitrate_bps.to_string();
    let keyint = fps.saturating_mul(2).max(2).to_string();
    let mut args: Vec<String> = vec!["-c:v".into(), encoder.into()];

    match encoder {
        "libx264" => args.extend(
            ["-preset", "veryfast", "-tune", "zerolatency"]
                .iter()
                .map(|s| s.to_string()),
        ),
        "libvpx-vp9" => args.extend(
            ["-deadline", "realtime", "-cpu-used", "8", "-row-mt", "1"]
                .iter()
                .map(|s| s.to_string()),
        ),
        "libvpx" => args.extend(
            ["-deadline", "realtime", "-cpu-used", "8"]
                .iter()
                .map(|s| s.to_string()),
        ),
        _ => {}
    }

    args.extend([
        "-b:v".into(),
        bitrate.clone(),
        "-maxrate".into(),
        bitrate,
        "-bufsize".into(),
        (codec.bitrate_bps.saturating_mul(2)).to_string(),
        "-g".into(),
        keyint,
        "-pix_fmt".into(),
        "yuv420p".into(),
    ]);

    match codec.container {
        Container::Mp4 => args.extend([
            "-movflags".into(),
            "frag_keyframe+empty_moov+default_base_moof".into(),
            "-f".into(),
            "mp4".into(),
        ]),
        Container::Webm => args.extend(["-f".into(), "webm".into()]),
    }

    args.push("pipe:1".into());
    args
}

/// Opens ffmpeg encoder processes.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    probe: FfmpegCapabilityProbe,
}

impl FfmpegBackend {
    pub fn new(probe: FfmpegCapabilityProbe) -> Self {
        Self { probe }
    }
}

impl EncoderBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn open(
        &mut self,
        codec: &NegotiatedCodec,
        fps: u32,
        width: u32,
        height: u32,
        events: EncoderEventSender,
    ) -> PhoneframeResult<Box<dyn CaptureSurface>> {
        let encoder = self.probe.encoder_for(&codec.mime).ok_or_else(|| {
            PhoneframeError::capture_unavailable(format!("No ffmpeg encoder for {}", codec.mime))
        })?;

        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend([
            "-s".into(),
            format!("{width}x{height}"),
            "-r".into(),
            fps.to_string(),
            "-i".into(),
            "pipe:0".into(),
            "-an".into(),
        ]);
        args.extend(encoder_args(&encoder, codec, fps));

        tracing::debug!(?args, "Starting ffmpeg encoder");
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                PhoneframeError::capture_unavailable(format!("Failed to start ffmpeg: {e}"))
            })?;

        tracing::info!(pid = child.id(), encoder = %encoder, "ffmpeg encoder started");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PhoneframeError::capture_unavailable("Failed to open ffmpeg stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PhoneframeError::capture_unavailable("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PhoneframeError::capture_unavailable("Failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently to avoid ffmpeg blocking on a full stderr pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let child = Arc::new(Mutex::new(child));
        let stats = Arc::new(Mutex::new(PipelineStats::default()));

        let monitor = {
            let child = Arc::clone(&child);
            let events = events.clone();
            std::thread::spawn(move || monitor_output(stdout, stderr_task, child, events))
        };

        let (frames_tx, frames_rx) = sync_channel::<FrameJob>(FRAME_QUEUE_DEPTH);
        let writer = {
            let stats = Arc::clone(&stats);
            std::thread::spawn(move || write_frames(stdin, frames_rx, stats, events))
        };

        Ok(Box::new(FfmpegSurface {
            cadence: FrameCadence::new(fps),
            frames_tx: Some(frames_tx),
            frames_sent: 0,
            frames_dropped: 0,
            child,
            stats,
            writer: Some(writer),
            monitor: Some(monitor),
        }))
    }
}

/// One rendered frame, written `copies` times to keep a constant rate.
struct FrameJob {
    data: Vec<u8>,
    copies: u64,
}

struct FfmpegSurface {
    cadence: FrameCadence,
    frames_tx: Option<SyncSender<FrameJob>>,
    frames_sent: u64,
    frames_dropped: u64,
    child: Arc<Mutex<Child>>,
    stats: Arc<Mutex<PipelineStats>>,
    writer: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl CaptureSurface for FfmpegSurface {
    fn push_frame(&mut self, target: &RenderTarget, timestamp: Duration) -> PhoneframeResult<()> {
        let Some(tx) = &self.frames_tx else {
            return Err(PhoneframeError::encoder_fault("Encoder input already closed"));
        };

        let due = self.cadence.frames_due(timestamp);
        if due <= self.frames_sent {
            return Ok(());
        }

        let job = FrameJob {
            data: target.rgba_bytes().to_vec(),
            copies: due - self.frames_sent,
        };
        match tx.try_send(job) {
            Ok(()) => {
                self.frames_sent = due;
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.frames_dropped += 1;
                tracing::trace!(due, sent = self.frames_sent, "Encoder busy; frame dropped");
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(PhoneframeError::encoder_fault("ffmpeg stopped accepting frames"))
            }
        }
    }

    fn request_stop(&mut self) -> PhoneframeResult<()> {
        // Closing the queue lets the writer finish and close stdin, which
        // makes ffmpeg flush and exit.
        self.frames_tx = None;
        tracing::debug!(frames = self.frames_sent, "Closed encoder input");
        Ok(())
    }

    fn release(&mut self) {
        self.frames_tx = None;

        match self.child.lock() {
            Ok(mut child) => {
                if matches!(child.try_wait(), Ok(None)) {
                    if let Err(e) = child.kill() {
                        tracing::warn!(error = %e, "Failed to kill ffmpeg encoder");
                    }
                }
            }
            Err(_) => tracing::warn!("ffmpeg child handle poisoned"),
        }

        for handle in [self.writer.take(), self.monitor.take()].into_iter().flatten() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }

    fn stats(&self) -> PipelineStats {
        let mut stats = self
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        stats.frames_dropped = self.frames_dropped;
        stats
    }
}

impl Drop for FfmpegSurface {
    fn drop(&mut self) {
        self.release();
    }
}

fn write_frames(
    stdin: ChildStdin,
    frames: std::sync::mpsc::Receiver<FrameJob>,
    stats: Arc<Mutex<PipelineStats>>,
    events: EncoderEventSender,
) {
    let mut stdin = stdin;
    if let Err(e) = write_jobs(&mut stdin, frames, &stats) {
        tracing::warn!(error = %e, "Writing frame to ffmpeg failed");
        let _ = events.send(EncoderEvent::Fault(format!(
            "Failed to write frame to ffmpeg: {e}"
        )));
        return;
    }
    if let Err(e) = stdin.flush() {
        tracing::debug!(error = %e, "Flushing ffmpeg stdin failed");
    }
    // Dropping stdin signals end of input.
}

/// Write every job `copies` times. Each job counts as one captured frame;
/// the remaining copies are counted as duplicates.
fn write_jobs<W: Write>(
    out: &mut W,
    jobs: impl IntoIterator<Item = FrameJob>,
    stats: &Mutex<PipelineStats>,
) -> std::io::Result<()> {
    for job in jobs {
        for copy in 0..job.copies {
            out.write_all(&job.data)?;
            if let Ok(mut stats) = stats.lock() {
                if copy == 0 {
                    stats.frames_captured += 1;
                } else {
                    stats.frames_duplicated += 1;
                }
                stats.bytes_written += job.data.len() as u64;
            }
        }
    }
    Ok(())
}

fn monitor_output(
    stdout: std::process::ChildStdout,
    stderr_task: JoinHandle<String>,
    child: Arc<Mutex<Child>>,
    events: EncoderEventSender,
) {
    let mut stdout = stdout;
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if events.send(EncoderEvent::Chunk(buf[..n].to_vec())).is_err() {
                    // Session is gone; nobody wants the rest.
                    return;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = events.send(EncoderEvent::Fault(format!(
                    "Failed reading ffmpeg output: {e}"
                )));
                return;
            }
        }
    }

    let status = match child.lock() {
        Ok(mut child) => child.wait(),
        Err(_) => {
            let _ = events.send(EncoderEvent::Fault("ffmpeg child handle poisoned".into()));
            return;
        }
    };
    let stderr_output = stderr_task
        .join()
        .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

    let event = match status {
        Ok(status) if status.success() => {
            tracing::debug!("ffmpeg encoder exited cleanly");
            EncoderEvent::Flushed
        }
        Ok(status) => EncoderEvent::Fault(format!(
            "ffmpeg encoder failed (status {status}): {}",
            stderr_output.trim()
        )),
        Err(e) => EncoderEvent::Fault(format!("Failed to wait on ffmpeg: {e}")),
    };
    let _ = events.send(event);
}
