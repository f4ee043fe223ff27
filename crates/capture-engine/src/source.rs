//! ffmpeg-backed source video.
//!
//! A decoder thread streams raw RGBA frames out of `ffmpeg` at the capture
//! rate into a short queue. The provider's playback clock is wall time
//! since [`SourceFrameProvider::play_from_start`]; each read takes the
//! newest decoded frame that is not ahead of that clock. When the file
//! ends, the decoder starts over, so playback loops like a looping video
//! element.

use std::io::{ErrorKind as IoErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use phoneframe_common::error::{PhoneframeError, PhoneframeResult};
use phoneframe_render_engine::{SourceFrameProvider, VideoFrame};
use serde::Deserialize;

/// Decoded frames buffered ahead of playback.
const DECODE_QUEUE_DEPTH: usize = 4;

/// Container extensions accepted without a warning.
pub const KNOWN_VIDEO_EXTENSIONS: &[&str] =
    &["mp4", "mov", "m4v", "quicktime", "avi", "webm", "mkv"];

/// Whether `path` has one of [`KNOWN_VIDEO_EXTENSIONS`].
pub fn has_known_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            KNOWN_VIDEO_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Stream properties reported by ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub duration: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probe `path` with ffprobe.
pub fn probe_source(path: &Path) -> PhoneframeResult<SourceInfo> {
    if !path.exists() {
        return Err(PhoneframeError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,duration:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| PhoneframeError::source(format!("Failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(PhoneframeError::source(format!(
            "ffprobe could not read {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&output.stdout).map_err(|e| match e {
        PhoneframeError::Source { message } => {
            PhoneframeError::source(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}

fn parse_probe_output(json: &[u8]) -> PhoneframeResult<SourceInfo> {
    let parsed: ProbeOutput = serde_json::from_slice(json)?;
    let stream = parsed
        .streams
        .first()
        .ok_or_else(|| PhoneframeError::source("No video stream"))?;

    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        return Err(PhoneframeError::source("Video stream has no dimensions"));
    };
    if width == 0 || height == 0 {
        return Err(PhoneframeError::source(format!(
            "Invalid video dimensions {width}x{height}"
        )));
    }

    let duration = parsed
        .format
        .as_ref()
        .and_then(|f| parse_seconds(f.duration.as_deref()))
        .or_else(|| parse_seconds(stream.duration.as_deref()));

    Ok(SourceInfo {
        width,
        height,
        duration,
    })
}

fn parse_seconds(raw: Option<&str>) -> Option<Duration> {
    let secs = raw?.trim().parse::<f64>().ok()?;
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs))
}

type DecodedFrame = Result<(u64, Vec<u8>), String>;

struct Decoder {
    frames: Receiver<DecodedFrame>,
    /// Set once the first frame has been queued.
    primed: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// A video file played through ffmpeg.
pub struct FfmpegSource {
    path: PathBuf,
    info: SourceInfo,
    fps: u32,
    decoder: Option<Decoder>,
    started: Option<Instant>,
    current: Option<(u64, Vec<u8>)>,
}

impl FfmpegSource {
    /// Probe `path` and prepare to decode it at `fps`.
    pub fn open(path: impl Into<PathBuf>, fps: u32) -> PhoneframeResult<Self> {
        let path = path.into();
        let info = probe_source(&path)?;
        tracing::info!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            duration_ms = info.duration.map(|d| d.as_millis() as u64),
            "Opened source video"
        );
        Ok(Self {
            path,
            info,
            fps: fps.max(1),
            decoder: None,
            started: None,
            current: None,
        })
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Index of the frame that should be on screen now.
    fn wanted_index(&self) -> u64 {
        let Some(started) = self.started else {
            return 0;
        };
        (started.elapsed().as_nanos() * self.fps as u128 / 1_000_000_000) as u64
    }

    fn stop_decoder(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            // Dropping the receiver makes the thread's next send fail.
            drop(decoder.frames);
            if let Some(handle) = decoder.thread.take() {
                if handle.is_finished() {
                    let _ = handle.join();
                }
            }
        }
    }
}

impl SourceFrameProvider for FfmpegSource {
    fn natural_size(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    fn duration(&self) -> Option<Duration> {
        self.info.duration
    }

    fn position(&self) -> Duration {
        let Some(started) = self.started else {
            return Duration::ZERO;
        };
        let elapsed = started.elapsed();
        match self.info.duration {
            Some(d) if !d.is_zero() => {
                Duration::from_nanos((elapsed.as_nanos() % d.as_nanos()) as u64)
            }
            _ => elapsed,
        }
    }

    fn is_frame_ready(&self) -> bool {
        self.current.is_some()
            || self
                .decoder
                .as_ref()
                .is_some_and(|d| d.primed.load(Ordering::Acquire))
    }

    fn read_frame(&mut self) -> PhoneframeResult<VideoFrame<'_>> {
        let wanted = self.wanted_index();
        let Some(decoder) = &self.decoder else {
            return Err(PhoneframeError::transient_frame_read("Source is not playing"));
        };

        let needs_frame = self
            .current
            .as_ref()
            .map_or(true, |(index, _)| *index < wanted);
        if needs_frame {
            loop {
                match decoder.frames.try_recv() {
                    Ok(Ok((index, data))) => {
                        let done = index >= wanted;
                        self.current = Some((index, data));
                        if done {
                            break;
                        }
                    }
                    Ok(Err(message)) => {
                        return Err(PhoneframeError::transient_frame_read(message));
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        if self.current.is_none() {
                            return Err(PhoneframeError::transient_frame_read(
                                "Decoder stopped before producing a frame",
                            ));
                        }
                        break;
                    }
                }
            }
        }

        match &self.current {
            Some((_, data)) => VideoFrame::new(self.info.width, self.info.height, data),
            None => Err(PhoneframeError::transient_frame_read("No frame decoded yet")),
        }
    }

    fn play_from_start(&mut self) -> PhoneframeResult<()> {
        self.stop_decoder();
        self.current = None;

        let (tx, rx) = sync_channel(DECODE_QUEUE_DEPTH);
        let primed = Arc::new(AtomicBool::new(false));
        let path = self.path.clone();
        let (width, height, fps) = (self.info.width, self.info.height, self.fps);
        let thread = {
            let primed = Arc::clone(&primed);
            std::thread::Builder::new()
                .name("phoneframe-decoder".into())
                .spawn(move || decode_loop(&path, width, height, fps, &tx, &primed))
                .map_err(|e| PhoneframeError::source(format!("Failed to start decoder: {e}")))?
        };

        self.decoder = Some(Decoder {
            frames: rx,
            primed,
            thread: Some(thread),
        });
        self.started = Some(Instant::now());
        tracing::debug!(path = %self.path.display(), "Source playback restarted");
        Ok(())
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.stop_decoder();
    }
}

/// Decode `path` over and over, numbering frames continuously across
/// passes, until the receiver goes away.
fn decode_loop(
    path: &Path,
    width: u32,
    height: u32,
    fps: u32,
    tx: &SyncSender<DecodedFrame>,
    primed: &AtomicBool,
) {
    let frame_len = width as usize * height as usize * 4;
    let mut next_index = 0u64;

    loop {
        let mut child = match Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(path)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgba", "-r"])
            .arg(fps.to_string())
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let _ = tx.send(Err(format!("Failed to start ffmpeg decoder: {e}")));
                return;
            }
        };

        let Some(mut stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = tx.send(Err("Failed to capture decoder output".to_string()));
            return;
        };

        let mut decoded_this_pass = 0u64;
        loop {
            let mut frame = vec![0u8; frame_len];
            match stdout.read_exact(&mut frame) {
                Ok(()) => {
                    if tx.send(Ok((next_index, frame))).is_err() {
                        let _ = child.kill();
                        let _ = child.wait();
                        return;
                    }
                    primed.store(true, Ordering::Release);
                    next_index += 1;
                    decoded_this_pass += 1;
                }
                Err(e) if e.kind() == IoErrorKind::UnexpectedEof => break,
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = tx.send(Err(format!("Failed reading decoded frame: {e}")));
                    return;
                }
            }
        }

        let _ = child.wait();
        if decoded_this_pass == 0 {
            let _ = tx.send(Err(format!("No frames decoded from {}", path.display())));
            return;
        }
        tracing::trace!(frames = decoded_this_pass, "Source looped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "programs": [],
            "streams": [{ "width": 1920, "height": 1080 }],
            "format": { "duration": "10.000000" }
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert_eq!(info.duration, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_missing_duration_is_unknown() {
        let json = br#"{ "streams": [{ "width": 640, "height": 480, "duration": "N/A" }],
                         "format": { "duration": "N/A" } }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.duration, None);
    }

    #[test]
    fn test_stream_duration_fallback() {
        let json = br#"{ "streams": [{ "width": 640, "height": 480, "duration": "2.5" }] }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.duration, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_no_video_stream() {
        let err = parse_probe_output(br#"{ "streams": [] }"#).unwrap_err();
        assert!(err.to_string().contains("No video stream"));
    }

    #[test]
    fn test_known_extensions() {
        assert!(has_known_video_extension(Path::new("clip.MOV")));
        assert!(has_known_video_extension(Path::new("/tmp/a.webm")));
        assert!(!has_known_video_extension(Path::new("notes.txt")));
        assert!(!has_known_video_extension(Path::new("noext")));
    }

    #[test]
    fn test_missing_file() {
        let err = probe_source(Path::new("/definitely/not/here.mp4")).unwrap_err();
        assert!(matches!(err, PhoneframeError::FileNotFound { .. }));
    }
}
