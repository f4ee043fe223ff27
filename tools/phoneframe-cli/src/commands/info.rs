//! Show source information.

use std::path::PathBuf;

use phoneframe_capture_engine::source::{has_known_video_extension, probe_source};
use phoneframe_capture_engine::DurationPolicy;
use phoneframe_common::config::AppConfig;
use phoneframe_frame_model::{compute_geometry, fit_source, FitPolicy, LAYOUT};

pub fn run(config: &AppConfig, input: PathBuf) -> anyhow::Result<()> {
    let info = probe_source(&input).map_err(|e| anyhow::anyhow!("Failed to probe source: {e}"))?;
    let policy = DurationPolicy::from(&config.export);

    println!("Source: {}", input.display());
    if !has_known_video_extension(&input) {
        println!("  [WARN] Unrecognized video extension");
    }
    println!("  Resolution: {}x{}", info.width, info.height);
    match info.duration {
        Some(d) => println!("  Duration: {:.2}s", d.as_secs_f64()),
        None => println!("  Duration: unknown"),
    }
    println!();

    let target = policy.target_for(info.duration);
    println!("Recording:");
    println!(
        "  Length: {:.1}s (cap {:.0}s, fallback {:.0}s)",
        target.as_secs_f64(),
        policy.max.as_secs_f64(),
        policy.fallback.as_secs_f64()
    );
    println!(
        "  Output: {}x{} @ {}fps",
        LAYOUT.target_width, LAYOUT.target_height, config.export.fps
    );
    println!();

    println!("Placement in screen:");
    let screen = compute_geometry(0.0).screen_rect();
    for fit in [FitPolicy::Width, FitPolicy::Contain] {
        if let Some(dest) = fit_source(fit, info.width, info.height, &screen) {
            let marker = if fit == config.export.fit_policy { "*" } else { " " };
            println!(
                " {marker}{:>8}: {:.0}x{:.0} at ({:.0}, {:.0})",
                fit.as_str(),
                dest.w,
                dest.h,
                dest.x,
                dest.y
            );
        }
    }

    Ok(())
}
