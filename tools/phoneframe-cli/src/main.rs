//! Phoneframe CLI: record a video inside an animated phone frame.
//!
//! Usage:
//!   phoneframe export <INPUT>     Record the framed video to a file
//!   phoneframe preview [INPUT]    Render a single framed still to PNG
//!   phoneframe info <INPUT>       Show source and recording information
//!   phoneframe check              Check encoder capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use phoneframe_common::config::{AppConfig, CapabilityClass};
use phoneframe_frame_model::FitPolicy;

mod commands;

#[derive(Parser)]
#[command(
    name = "phoneframe",
    about = "Record any video inside an animated 4:3 phone mockup",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a source video inside the phone frame
    Export {
        /// Source video file
        input: PathBuf,

        /// Output directory (defaults to the configured download directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Capture frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Encoder capability class: standard|constrained
        #[arg(long)]
        class: Option<CapabilityClass>,

        /// Output filename without extension
        #[arg(long)]
        name: Option<String>,

        /// Source fit policy: width|contain
        #[arg(long)]
        fit: Option<FitPolicy>,

        /// Font file for the watermark
        #[arg(long)]
        font: Option<PathBuf>,

        /// Watermark text (empty disables it)
        #[arg(long)]
        watermark: Option<String>,
    },

    /// Render one composited frame to a PNG
    Preview {
        /// Source video to show on the screen (the frame playing just after start)
        input: Option<PathBuf>,

        /// Output PNG path
        #[arg(short, long, default_value = "phone-frame-preview.png")]
        output: PathBuf,

        /// Animation time in seconds
        #[arg(long, default_value = "0.0")]
        at: f64,

        /// Source fit policy: width|contain
        #[arg(long)]
        fit: Option<FitPolicy>,
    },

    /// Show source and recording information
    Info {
        /// Source video file
        input: PathBuf,
    },

    /// Check encoder capabilities
    Check {
        /// Encoder capability class: standard|constrained
        #[arg(long)]
        class: Option<CapabilityClass>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    phoneframe_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Export {
            input,
            output,
            fps,
            class,
            name,
            fit,
            font,
            watermark,
        } => {
            let overrides = commands::export::Overrides {
                output,
                fps,
                class,
                name,
                fit,
                font,
                watermark,
            };
            commands::export::run(&config, input, overrides).await
        }
        Commands::Preview {
            input,
            output,
            at,
            fit,
        } => commands::preview::run(&config, input, output, at, fit).await,
        Commands::Info { input } => commands::info::run(&config, input),
        Commands::Check { class } => commands::check::run(&config, class),
    }
}
