// SPDX-License-Identifier: GPL-3.0-only

//! Capture configuration and persisted host settings
//!
//! [`CameraConfiguration`] is the immutable value a controller is built
//! from. [`Settings`] holds the host-level preferences (output folders,
//! device paths, encoder quality) persisted as JSON in the user's config
//! directory.

use crate::constants::{DEFAULT_TARGET_FPS, VideoQuality, photo::DEFAULT_JPEG_QUALITY};
use crate::errors::SettingsError;
use crate::flash::FlashMode;
use crate::plugins::CameraPlugin;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Which physical sensor is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CameraLens {
    /// User-facing camera
    Front,
    /// World-facing camera
    #[default]
    Back,
}

impl CameraLens {
    /// The opposite lens
    pub fn flipped(self) -> Self {
        match self {
            CameraLens::Front => CameraLens::Back,
            CameraLens::Back => CameraLens::Front,
        }
    }
}

impl FromStr for CameraLens {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" | "user" => Ok(CameraLens::Front),
            "back" | "rear" | "environment" => Ok(CameraLens::Back),
            other => Err(format!("unknown lens '{}'", other)),
        }
    }
}

/// Still image output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
}

impl ImageFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            other => Err(format!("unknown image format '{}'", other)),
        }
    }
}

/// Well-known output locations for captured media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Directory {
    Pictures,
    Movies,
    Dcim,
    Cache,
}

impl Directory {
    /// Resolve to an absolute path on this platform
    ///
    /// DCIM is not an XDG directory; it lives under the pictures directory
    /// on desktops. Falls back to the home directory, then the working
    /// directory, when the platform has no answer.
    pub fn resolve(&self) -> PathBuf {
        let base = match self {
            Directory::Pictures => dirs::picture_dir(),
            Directory::Movies => dirs::video_dir(),
            Directory::Dcim => dirs::picture_dir().map(|p| p.join("DCIM")),
            Directory::Cache => dirs::cache_dir(),
        };
        base.or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

impl FromStr for Directory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pictures" => Ok(Directory::Pictures),
            "movies" | "videos" => Ok(Directory::Movies),
            "dcim" => Ok(Directory::Dcim),
            "cache" => Ok(Directory::Cache),
            other => Err(format!("unknown directory '{}'", other)),
        }
    }
}

/// Desired capture parameters and the attached plugin set
///
/// Values are immutable: every `with_*` method returns a new configuration
/// and leaves `self` untouched. Two configurations are equal when their
/// scalar fields match and they hold the same plugin instances in the same
/// order.
#[derive(Clone)]
pub struct CameraConfiguration {
    lens: CameraLens,
    flash_mode: FlashMode,
    image_format: ImageFormat,
    video_quality: VideoQuality,
    target_fps: u32,
    enable_hdr: bool,
    plugins: Vec<Arc<dyn CameraPlugin>>,
}

impl Default for CameraConfiguration {
    fn default() -> Self {
        Self {
            lens: CameraLens::Back,
            flash_mode: FlashMode::Off,
            image_format: ImageFormat::Jpeg,
            video_quality: VideoQuality::Fhd,
            target_fps: DEFAULT_TARGET_FPS,
            enable_hdr: false,
            plugins: Vec::new(),
        }
    }
}

impl CameraConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lens(&self) -> CameraLens {
        self.lens
    }

    pub fn flash_mode(&self) -> FlashMode {
        self.flash_mode
    }

    pub fn image_format(&self) -> ImageFormat {
        self.image_format
    }

    pub fn video_quality(&self) -> VideoQuality {
        self.video_quality
    }

    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    pub fn enable_hdr(&self) -> bool {
        self.enable_hdr
    }

    pub fn plugins(&self) -> &[Arc<dyn CameraPlugin>] {
        &self.plugins
    }

    /// Look up an attached plugin by id
    pub fn plugin(&self, id: &str) -> Option<&Arc<dyn CameraPlugin>> {
        self.plugins.iter().find(|p| p.id() == id)
    }

    pub fn with_lens(&self, lens: CameraLens) -> Self {
        Self {
            lens,
            ..self.clone()
        }
    }

    pub fn with_flash_mode(&self, flash_mode: FlashMode) -> Self {
        Self {
            flash_mode,
            ..self.clone()
        }
    }

    pub fn with_image_format(&self, image_format: ImageFormat) -> Self {
        Self {
            image_format,
            ..self.clone()
        }
    }

    pub fn with_video_quality(&self, video_quality: VideoQuality) -> Self {
        Self {
            video_quality,
            ..self.clone()
        }
    }

    /// Frame rate is kept positive; zero is raised to 1
    pub fn with_target_fps(&self, target_fps: u32) -> Self {
        Self {
            target_fps: target_fps.max(1),
            ..self.clone()
        }
    }

    pub fn with_hdr(&self, enable_hdr: bool) -> Self {
        Self {
            enable_hdr,
            ..self.clone()
        }
    }

    /// Add a plugin, replacing one with the same id in place
    pub fn with_plugin(&self, plugin: Arc<dyn CameraPlugin>) -> Self {
        let mut plugins = self.plugins.clone();
        match plugins.iter().position(|p| p.id() == plugin.id()) {
            Some(index) => plugins[index] = plugin,
            None => plugins.push(plugin),
        }
        Self {
            plugins,
            ..self.clone()
        }
    }

    /// Remove the plugin with `id`; an unknown id yields an equal configuration
    pub fn without_plugin(&self, id: &str) -> Self {
        Self {
            plugins: self
                .plugins
                .iter()
                .filter(|p| p.id() != id)
                .cloned()
                .collect(),
            ..self.clone()
        }
    }
}

impl PartialEq for CameraConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.lens == other.lens
            && self.flash_mode == other.flash_mode
            && self.image_format == other.image_format
            && self.video_quality == other.video_quality
            && self.target_fps == other.target_fps
            && self.enable_hdr == other.enable_hdr
            && self.plugins.len() == other.plugins.len()
            && self
                .plugins
                .iter()
                .zip(&other.plugins)
                .all(|(a, b)| a.id() == b.id() && Arc::ptr_eq(a, b))
    }
}

impl fmt::Debug for CameraConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plugin_ids: Vec<&str> = self.plugins.iter().map(|p| p.id()).collect();
        f.debug_struct("CameraConfiguration")
            .field("lens", &self.lens)
            .field("flash_mode", &self.flash_mode)
            .field("image_format", &self.image_format)
            .field("video_quality", &self.video_quality)
            .field("target_fps", &self.target_fps)
            .field("enable_hdr", &self.enable_hdr)
            .field("plugins", &plugin_ids)
            .finish()
    }
}

/// Host settings persisted between runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where photos are saved
    pub photo_directory: Directory,
    /// Where recordings are saved
    pub video_directory: Directory,
    /// Sub-folder created inside the output directories
    pub subdirectory: String,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Device path for the front lens (e.g. "/dev/video2")
    pub front_device: Option<String>,
    /// Device path for the back lens
    pub back_device: Option<String>,
    /// Record microphone audio with video
    pub record_audio: bool,
    /// Override for the URI opened by "open app settings"
    pub app_settings_uri: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            photo_directory: Directory::Pictures,
            video_directory: Directory::Movies,
            subdirectory: "crosscam".to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            front_device: None,
            back_device: None,
            record_audio: true,
            app_settings_uri: None,
        }
    }
}

impl Settings {
    /// Default settings file location
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        dirs::config_dir()
            .map(|dir| dir.join("crosscam").join("settings.json"))
            .ok_or(SettingsError::NoConfigDir)
    }

    /// Load from the default location
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let settings: Settings = serde_json::from_str(&contents)?;
                debug!(path = %path.display(), "Loaded settings");
                Ok(settings.sanitized())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Saved settings");
        Ok(())
    }

    /// Resolved photo output folder
    pub fn photo_dir(&self) -> PathBuf {
        self.photo_directory.resolve().join(&self.subdirectory)
    }

    /// Resolved video output folder
    pub fn video_dir(&self) -> PathBuf {
        self.video_directory.resolve().join(&self.subdirectory)
    }

    /// Configured device path for a lens
    pub fn device_for(&self, lens: CameraLens) -> Option<&str> {
        match lens {
            CameraLens::Front => self.front_device.as_deref(),
            CameraLens::Back => self.back_device.as_deref(),
        }
    }

    fn sanitized(mut self) -> Self {
        self.jpeg_quality = self.jpeg_quality.clamp(1, 100);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lens_flip() {
        assert_eq!(CameraLens::Back.flipped(), CameraLens::Front);
        assert_eq!(CameraLens::Front.flipped().flipped(), CameraLens::Front);
    }

    #[test]
    fn test_zero_fps_is_raised() {
        let config = CameraConfiguration::default().with_target_fps(0);
        assert_eq!(config.target_fps(), 1);
    }

    #[test]
    fn test_settings_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("none.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_settings_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "jpeg_quality": 0, "photo_directory": "DCIM" }"#).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.photo_directory, Directory::Dcim);
        assert_eq!(settings.jpeg_quality, 1);
        assert_eq!(settings.subdirectory, "crosscam");
    }

    #[test]
    fn test_settings_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Settings::load_from(&path),
            Err(SettingsError::Parse(_))
        ));
    }
}
