// SPDX-License-Identifier: GPL-3.0-only

//! Recording results, file naming and encoder presets

use crate::constants::VideoQuality;
use crate::errors::CameraException;
use std::path::{Path, PathBuf};

/// Outcome of stopping a recording
#[derive(Debug, Clone)]
pub enum VideoRecordingResult {
    Success {
        duration_ms: u64,
        /// Final file, if the recording was persisted
        output: Option<PathBuf>,
    },
    Error(CameraException),
}

impl VideoRecordingResult {
    pub fn is_success(&self) -> bool {
        matches!(self, VideoRecordingResult::Success { .. })
    }

    pub fn error(&self) -> Option<&CameraException> {
        match self {
            VideoRecordingResult::Error(err) => Some(err),
            VideoRecordingResult::Success { .. } => None,
        }
    }

    pub fn output(&self) -> Option<&Path> {
        match self {
            VideoRecordingResult::Success { output, .. } => output.as_deref(),
            VideoRecordingResult::Error(_) => None,
        }
    }
}

/// Timestamped file name, e.g. `video_20250101_120000.mp4`
pub fn recording_filename(container: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("video_{}.{}", timestamp, container)
}

/// Encoder parameters derived from a quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_kbps: u32,
    /// Keyframe interval in frames (two seconds)
    pub keyframe_interval: u32,
}

impl EncoderSettings {
    pub fn for_quality(quality: VideoQuality, fps: u32) -> Self {
        let (width, height) = quality.resolution();
        let fps = fps.max(1);
        Self {
            width,
            height,
            fps,
            bitrate_kbps: quality.bitrate_kbps(),
            keyframe_interval: fps * 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_settings_follow_quality() {
        let settings = EncoderSettings::for_quality(VideoQuality::Hd, 24);
        assert_eq!((settings.width, settings.height), (1280, 720));
        assert_eq!(settings.bitrate_kbps, 5_000);
        assert_eq!(settings.keyframe_interval, 48);
    }

    #[test]
    fn test_recording_filename() {
        let name = recording_filename("y4m");
        assert!(name.starts_with("video_"));
        assert!(name.ends_with(".y4m"));
    }
}
