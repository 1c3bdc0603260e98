// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use crosscam::{CameraLens, FlashMode, ImageFormat, Settings, VideoQuality};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "crosscam")]
#[command(about = "Capture photos, record video and scan barcodes from the command line")]
#[command(version)]
struct Cli {
    /// Settings file (default: ~/.config/crosscam/settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a photo
    Photo {
        /// Lens to use (front, back)
        #[arg(short, long, default_value = "back")]
        lens: CameraLens,

        /// Image format (jpeg, png)
        #[arg(short, long, default_value = "jpeg")]
        format: ImageFormat,

        /// Flash mode (off, on, auto, torch)
        #[arg(long, default_value = "off")]
        flash: FlashMode,

        /// Output file or directory (default: ~/Pictures/crosscam/)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Record a video
    Record {
        /// Lens to use (front, back)
        #[arg(short, long, default_value = "back")]
        lens: CameraLens,

        /// Quality preset (sd, hd, fhd, uhd)
        #[arg(short, long, default_value = "fhd")]
        quality: VideoQuality,

        /// Recording duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Output file or directory (default: ~/Videos/crosscam/)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Enable audio recording
        #[arg(short, long)]
        audio: bool,
    },

    /// Scan barcodes and QR codes
    Scan {
        /// Lens to use (front, back)
        #[arg(short, long, default_value = "back")]
        lens: CameraLens,

        /// How long to scan, in seconds
        #[arg(short, long, default_value = "30")]
        seconds: u64,
    },

    /// Show camera, microphone and storage permissions
    Permissions {
        /// Ask for camera and microphone access
        #[arg(long)]
        request: bool,

        /// Open the system privacy settings
        #[arg(long)]
        open_settings: bool,
    },
}

fn load_settings(path: Option<&PathBuf>) -> Settings {
    let loaded = match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    loaded.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load settings, using defaults");
        Settings::default()
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control the log level
    // Examples: RUST_LOG=debug, RUST_LOG=crosscam=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(cli.settings.as_ref());

    match cli.command {
        Commands::Photo {
            lens,
            format,
            flash,
            output,
        } => cli::take_photo(settings, lens, format, flash, output),
        Commands::Record {
            lens,
            quality,
            duration,
            output,
            audio,
        } => cli::record_video(settings, lens, quality, duration, output, audio),
        Commands::Scan { lens, seconds } => cli::scan_barcodes(settings, lens, seconds),
        Commands::Permissions {
            request,
            open_settings,
        } => cli::permissions(settings, request, open_settings),
    }
}
