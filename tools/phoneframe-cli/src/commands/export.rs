//! Record a source video inside the phone frame.

use std::path::PathBuf;
use std::sync::Arc;

use phoneframe_capture_engine::ffmpeg::{FfmpegBackend, FfmpegCapabilityProbe};
use phoneframe_capture_engine::source::{has_known_video_extension, FfmpegSource};
use phoneframe_capture_engine::{
    CancelHandle, ExportDriver, ExportProgress, ExportSettings, ExportStage, FileDownloadSink,
    PipelineStats, ProgressCallback,
};
use phoneframe_common::config::{AppConfig, CapabilityClass};
use phoneframe_frame_model::FitPolicy;

/// Command-line values that take precedence over the config file.
pub struct Overrides {
    pub output: Option<PathBuf>,
    pub fps: Option<u32>,
    pub class: Option<CapabilityClass>,
    pub name: Option<String>,
    pub fit: Option<FitPolicy>,
    pub font: Option<PathBuf>,
    pub watermark: Option<String>,
}

pub async fn run(config: &AppConfig, input: PathBuf, overrides: Overrides) -> anyhow::Result<()> {
    println!("Exporting: {}", input.display());
    if !has_known_video_extension(&input) {
        println!("  [WARN] Unrecognized video extension; trying anyway");
    }

    let mut defaults = config.export.clone();
    if let Some(fps) = overrides.fps {
        anyhow::ensure!(fps > 0, "--fps must be positive");
        defaults.fps = fps;
    }
    if let Some(class) = overrides.class {
        defaults.capability_class = class;
    }
    if let Some(name) = overrides.name {
        defaults.filename_base = name;
    }
    if let Some(fit) = overrides.fit {
        defaults.fit_policy = fit;
    }
    if let Some(font) = overrides.font {
        defaults.font_path = Some(font);
    }
    if let Some(text) = overrides.watermark {
        defaults.brand_text = text;
    }
    let output_dir = overrides.output.unwrap_or_else(|| config.output_dir.clone());
    let settings = ExportSettings::from(&defaults);

    let mut source = FfmpegSource::open(&input, settings.fps)
        .map_err(|e| anyhow::anyhow!("Failed to open source: {e}"))?;
    let probe = FfmpegCapabilityProbe::detect()?;

    let info = source.info().clone();
    let target = settings.duration.target_for(info.duration);
    println!("  Source: {}x{}", info.width, info.height);
    println!("  Recording: {:.1}s @ {}fps", target.as_secs_f64(), settings.fps);
    println!("  Class: {}", settings.capability_class.as_str());
    println!("  Fit: {}", settings.compositor.fit_policy.as_str());
    println!("  Output dir: {}", output_dir.display());

    let mut driver = ExportDriver::new(
        settings,
        Arc::new(probe.clone()),
        Box::new(FfmpegBackend::new(probe)),
        Arc::new(FileDownloadSink::new(output_dir)),
    );

    let cancel = CancelHandle::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n  Interrupted; finishing what was recorded so far");
            on_interrupt.cancel();
        }
    });

    let progress_cb: ProgressCallback = Box::new(|p: ExportProgress| match p.stage {
        ExportStage::Recording => print!(
            "\r  Progress: {:.1}% ({} frames, {:.1}/{:.1}s)  ",
            p.progress * 100.0,
            p.frames_rendered,
            p.elapsed.as_secs_f64(),
            p.target_duration.as_secs_f64(),
        ),
        ExportStage::Finalizing => print!("\r  Finalizing...{:40}", ""),
        _ => {}
    });

    match driver.run(Some(&mut source), &cancel, Some(progress_cb)).await {
        Ok(report) => {
            println!("\nExport complete: {}", report.path.display());
            println!(
                "  {} ({} bytes, {} frames, {:.1}s)",
                report.mime,
                report.bytes,
                report.frames_rendered,
                report.recorded.as_secs_f64()
            );
            if let Some(warning) = drop_warning(&report.stats) {
                println!("  [WARN] {warning}");
            }
            Ok(())
        }
        Err(e) => {
            println!("\nExport failed: {e}");
            Err(e.into())
        }
    }
}

fn drop_warning(stats: &PipelineStats) -> Option<String> {
    if stats.frames_dropped == 0 {
        return None;
    }
    Some(format!(
        "Encoder dropped {} frames ({:.1}%)",
        stats.frames_dropped,
        stats.drop_rate()
    ))
}
