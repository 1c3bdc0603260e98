// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Taking photos
//! - Recording videos
//! - Scanning barcodes
//! - Checking and requesting permissions

use crosscam::controller::CameraController;
use crosscam::permissions::{CameraPermission, PermissionManager};
use crosscam::{
    BarcodeScanner, CameraConfiguration, CameraLens, FlashMode, ImageFormat, Settings,
    VideoQuality, VideoRecordingResult, platform_controller,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Time given to auto exposure before the first still
const WARMUP: Duration = Duration::from_millis(500);

/// Take a photo
pub fn take_photo(
    settings: Settings,
    lens: CameraLens,
    format: ImageFormat,
    flash: FlashMode,
    output: Option<PathBuf>,
) -> CliResult {
    let configuration = CameraConfiguration::default()
        .with_lens(lens)
        .with_image_format(format)
        .with_flash_mode(flash);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(capture_photo(configuration, settings, output))
}

async fn capture_photo(
    configuration: CameraConfiguration,
    settings: Settings,
    output: Option<PathBuf>,
) -> CliResult {
    let controller = platform_controller(configuration, settings);
    controller.initialize().await?;
    println!("Capturing...");
    tokio::time::sleep(WARMUP).await;

    let result = controller.take_picture().await;
    controller.release();

    if let Some(err) = result.error() {
        return Err(err.clone().into());
    }
    let saved = result.path().ok_or("Photo was not written to disk")?;
    let final_path = move_output(saved, output.as_deref())?;
    println!("Photo saved: {}", final_path.display());
    Ok(())
}

/// Record a video for `duration` seconds or until Ctrl+C
pub fn record_video(
    mut settings: Settings,
    lens: CameraLens,
    quality: VideoQuality,
    duration: u64,
    output: Option<PathBuf>,
    audio: bool,
) -> CliResult {
    settings.record_audio = audio;
    let configuration = CameraConfiguration::default()
        .with_lens(lens)
        .with_video_quality(quality);

    let stop_flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(record(configuration, settings, quality, duration, output, stop_flag))
}

async fn record(
    configuration: CameraConfiguration,
    settings: Settings,
    quality: VideoQuality,
    duration: u64,
    output: Option<PathBuf>,
    stop_flag: Arc<AtomicBool>,
) -> CliResult {
    let audio = settings.record_audio;
    let controller = platform_controller(configuration, settings);
    controller.initialize().await?;

    println!(
        "Quality: {} ({})",
        quality.display_name(),
        crosscam::constants::format_bitrate(quality.bitrate_kbps())
    );
    println!("Duration: {} seconds", duration);
    if audio {
        println!("Audio: enabled");
    }
    println!();
    println!("Recording... (press Ctrl+C to stop early)");

    let recording = controller.start_recording().await?;
    let start = Instant::now();
    let target = Duration::from_secs(duration);
    while start.elapsed() < target {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }
        let elapsed = start.elapsed().as_secs();
        print!("\rRecording: {:02}:{:02}", elapsed / 60, elapsed % 60);
        std::io::Write::flush(&mut std::io::stdout())?;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    println!();

    let result = recording.stop().await;
    controller.release();
    match result {
        VideoRecordingResult::Success {
            duration_ms,
            output: Some(saved),
        } => {
            let final_path = move_output(&saved, output.as_deref())?;
            println!(
                "Video saved: {} ({:.1}s)",
                final_path.display(),
                duration_ms as f64 / 1000.0
            );
            Ok(())
        }
        VideoRecordingResult::Success { duration_ms, .. } => {
            println!("Recorded {:.1}s (not persisted)", duration_ms as f64 / 1000.0);
            Ok(())
        }
        VideoRecordingResult::Error(err) => Err(err.into()),
    }
}

/// Print every change of the detected barcodes for `seconds`
pub fn scan_barcodes(settings: Settings, lens: CameraLens, seconds: u64) -> CliResult {
    let scanner = Arc::new(BarcodeScanner::new());
    let configuration = CameraConfiguration::default()
        .with_lens(lens)
        .with_plugin(scanner.clone());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(scan(configuration, settings, scanner, seconds))
}

async fn scan(
    configuration: CameraConfiguration,
    settings: Settings,
    scanner: Arc<BarcodeScanner>,
    seconds: u64,
) -> CliResult {
    let controller = platform_controller(configuration, settings);
    controller.initialize().await?;
    println!("Scanning for {} seconds...", seconds);

    let mut barcodes = scanner.barcodes();
    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => break,
            update = barcodes.changed() => {
                let Some(update) = update else { break };
                for barcode in &update {
                    println!("[{:?}] {}", barcode.format, barcode.raw_value);
                    println!("    {:?}", barcode.value());
                }
            }
        }
    }

    println!(
        "Analyzed {} frames, dropped {} while busy",
        scanner.frames_analyzed(),
        scanner.frames_dropped()
    );
    controller.release();
    Ok(())
}

/// Show permission status, optionally prompting or opening settings
pub fn permissions(settings: Settings, request: bool, open_settings: bool) -> CliResult {
    let manager = PermissionManager::for_desktop(&settings);

    for permission in [
        CameraPermission::Camera,
        CameraPermission::Microphone,
        CameraPermission::Storage,
    ] {
        println!(
            "  {:<12} {:?}",
            permission.name(),
            manager.check_permission(permission)
        );
    }

    if request {
        let rt = tokio::runtime::Runtime::new()?;
        let result = rt.block_on(manager.request_camera_permissions());
        println!();
        println!("Requested:");
        for (permission, status) in result.permissions() {
            println!("  {:<12} {:?}", permission.name(), status);
        }
        if !result.all_granted() {
            println!("Some permissions are missing; grant them in the system settings.");
        }
    }

    if open_settings {
        manager.open_app_settings();
    }
    Ok(())
}

/// Move a saved capture to the user's requested location
fn move_output(saved: &Path, requested: Option<&Path>) -> Result<PathBuf, std::io::Error> {
    let Some(requested) = requested else {
        return Ok(saved.to_path_buf());
    };
    let target = if requested.is_dir() {
        match saved.file_name() {
            Some(name) => requested.join(name),
            None => requested.to_path_buf(),
        }
    } else {
        if let Some(parent) = requested.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        requested.to_path_buf()
    };
    if std::fs::rename(saved, &target).is_err() {
        // Different filesystem
        std::fs::copy(saved, &target)?;
        std::fs::remove_file(saved)?;
    }
    Ok(target)
}
