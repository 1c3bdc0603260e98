// SPDX-License-Identifier: GPL-3.0-only

//! Library-wide constants and the video quality tiers

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default capture frame rate
pub const DEFAULT_TARGET_FPS: u32 = 30;

/// Zoom ratio every session starts at
pub const DEFAULT_ZOOM_RATIO: f32 = 1.0;

/// Video quality tiers for recording
///
/// Each tier fixes a target resolution and an encoder bitrate tuned for
/// that resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VideoQuality {
    /// 480p
    Sd,
    /// 720p
    Hd,
    /// 1080p
    #[default]
    Fhd,
    /// 2160p (4K)
    Uhd,
}

impl VideoQuality {
    /// All tiers from lowest to highest
    pub const ALL: [VideoQuality; 4] = [
        VideoQuality::Sd,
        VideoQuality::Hd,
        VideoQuality::Fhd,
        VideoQuality::Uhd,
    ];

    /// Get display name for the tier
    pub fn display_name(&self) -> &'static str {
        match self {
            VideoQuality::Sd => "SD",
            VideoQuality::Hd => "HD",
            VideoQuality::Fhd => "Full HD",
            VideoQuality::Uhd => "4K",
        }
    }

    /// Target frame size (width, height)
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            VideoQuality::Sd => (640, 480),
            VideoQuality::Hd => (1280, 720),
            VideoQuality::Fhd => (1920, 1080),
            VideoQuality::Uhd => (3840, 2160),
        }
    }

    /// Encoder bitrate in kbps
    ///
    /// - SD: 2 Mbps
    /// - HD: 5 Mbps
    /// - Full HD: 8 Mbps
    /// - 4K: 30 Mbps
    pub fn bitrate_kbps(&self) -> u32 {
        match self {
            VideoQuality::Sd => 2_000,
            VideoQuality::Hd => 5_000,
            VideoQuality::Fhd => 8_000,
            VideoQuality::Uhd => 30_000,
        }
    }
}

impl FromStr for VideoQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sd" | "480p" => Ok(VideoQuality::Sd),
            "hd" | "720p" => Ok(VideoQuality::Hd),
            "fhd" | "1080p" => Ok(VideoQuality::Fhd),
            "uhd" | "4k" | "2160p" => Ok(VideoQuality::Uhd),
            other => Err(format!("unknown video quality '{}'", other)),
        }
    }
}

/// Format a bitrate for display (e.g., "8 Mbps" or "500 kbps")
pub fn format_bitrate(kbps: u32) -> String {
    if kbps >= 1000 && kbps % 1000 == 0 {
        format!("{} Mbps", kbps / 1000)
    } else if kbps >= 1000 {
        format!("{:.1} Mbps", kbps as f64 / 1000.0)
    } else {
        format!("{} kbps", kbps)
    }
}

/// Frame analysis tuning
pub mod detection {
    /// Frames are downscaled so their longest side is at most this before QR decoding
    pub const QR_MAX_DIMENSION: u32 = 640;
}

/// Photo output defaults
pub mod photo {
    /// JPEG quality used when settings do not override it
    pub const DEFAULT_JPEG_QUALITY: u8 = 92;
}

/// Timing constants for native pipelines and logging
pub mod timing {
    /// Log frame statistics every N frames
    pub const FRAME_LOG_INTERVAL: u64 = 120;

    /// Timeout when waiting for a native pipeline to stop
    pub const STOP_TIMEOUT_SECS: u64 = 2;

    /// Timeout when waiting for a native pipeline to start
    pub const START_TIMEOUT_SECS: u64 = 5;

    /// Timeout when waiting for a recording to finalize its file
    pub const RECORDING_FINALIZE_TIMEOUT_SECS: u64 = 5;
}
