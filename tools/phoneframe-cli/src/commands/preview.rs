//! Render a single composited frame to PNG.

use std::path::PathBuf;
use std::time::Duration;

use phoneframe_capture_engine::source::FfmpegSource;
use phoneframe_capture_engine::ExportSettings;
use phoneframe_common::config::AppConfig;
use phoneframe_frame_model::{compute_geometry, FitPolicy};
use phoneframe_render_engine::{Compositor, RenderTarget, SourceFrameProvider, VideoLayer};

/// How long to wait for the decoder to produce its first frame.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(
    config: &AppConfig,
    input: Option<PathBuf>,
    output: PathBuf,
    at: f64,
    fit: Option<FitPolicy>,
) -> anyhow::Result<()> {
    anyhow::ensure!(at.is_finite() && at >= 0.0, "--at must be a non-negative time");

    let mut defaults = config.export.clone();
    if let Some(fit) = fit {
        defaults.fit_policy = fit;
    }
    let settings = ExportSettings::from(&defaults);

    let mut compositor = Compositor::new(&settings.compositor)?;
    let mut target = RenderTarget::new()?;
    let geometry = compute_geometry(at);

    let layer = match input {
        Some(path) => {
            let mut source = FfmpegSource::open(&path, settings.fps)
                .map_err(|e| anyhow::anyhow!("Failed to open source: {e}"))?;
            source.play_from_start()?;

            let waited = tokio::time::timeout(FIRST_FRAME_TIMEOUT, async {
                while !source.is_frame_ready() {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            })
            .await;
            if waited.is_err() {
                println!("[WARN] No frame decoded within {}s", FIRST_FRAME_TIMEOUT.as_secs());
            }
            compositor.render_frame(&mut target, &geometry, Some(&mut source))
        }
        None => compositor.render_frame(&mut target, &geometry, None),
    };

    target.save_png(&output)?;
    println!("Preview written: {}", output.display());
    println!(
        "  t={at:.2}s, pulse {:.4}, fit {}, video {}",
        geometry.pulse_scale,
        compositor.fit_policy().as_str(),
        match layer {
            VideoLayer::Drawn => "drawn",
            VideoLayer::NotReady => "not shown",
            VideoLayer::ReadFailed => "read failed",
        }
    );
    Ok(())
}
