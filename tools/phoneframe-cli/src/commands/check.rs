//! Check encoder capabilities.

use phoneframe_capture_engine::ffmpeg::{command_exists, FfmpegCapabilityProbe};
use phoneframe_capture_engine::{negotiate, CapabilityProbe, CODEC_PREFERENCE};
use phoneframe_common::config::{AppConfig, CapabilityClass};

pub fn run(config: &AppConfig, class: Option<CapabilityClass>) -> anyhow::Result<()> {
    println!("Phoneframe System Check");
    println!("{}", "=".repeat(50));

    let mut ready = true;
    for binary in ["ffmpeg", "ffprobe"] {
        if command_exists(binary) {
            println!("[OK] {binary} found");
        } else {
            println!("[MISSING] {binary} not found on PATH");
            ready = false;
        }
    }
    if !ready {
        println!();
        println!("Install ffmpeg to export recordings.");
        return Ok(());
    }

    let probe = FfmpegCapabilityProbe::detect()?;
    println!();
    println!("Codec candidates:");
    for mime in CODEC_PREFERENCE {
        match probe.encoder_for(mime) {
            Some(encoder) if probe.is_supported(mime) => {
                println!("  [OK] {mime} via {encoder}");
            }
            _ => println!("  [--] {mime}"),
        }
    }

    let class = class.unwrap_or(config.export.capability_class);
    println!();
    match negotiate(&probe, CODEC_PREFERENCE, class) {
        Ok(codec) => println!(
            "Exports will use {} at {} Mbps ({} class).",
            codec.mime,
            codec.bitrate_bps / 1_000_000,
            class.as_str()
        ),
        Err(e) => println!("No export possible: {e}"),
    }

    Ok(())
}
