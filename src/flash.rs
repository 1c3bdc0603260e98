// SPDX-License-Identifier: GPL-3.0-only

//! Flash modes and sysfs flash LED control
//!
//! [`FlashMode`] is the platform-neutral setting carried by the
//! configuration and the `Ready` state. [`FlashLeds`] drives LEDs exposed at
//! `/sys/class/leds/*:flash` for backends that own the hardware directly.
//! Torch mode writes the `brightness` file, which is group-writable on most
//! phones running a mainline kernel, instead of the root-only strobe
//! interface.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Default sysfs directory scanned for flash LEDs
pub const SYSFS_LEDS_DIR: &str = "/sys/class/leds";

/// Flash operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlashMode {
    /// Flash never fires
    #[default]
    Off,
    /// Flash fires on every still capture
    On,
    /// Backend decides per capture
    Auto,
    /// LED stays on continuously
    Torch,
}

impl FlashMode {
    /// Cycle used by a flash toggle: Off -> On -> Auto -> Off, Torch -> Off
    pub fn next(self) -> Self {
        match self {
            FlashMode::Off => FlashMode::On,
            FlashMode::On => FlashMode::Auto,
            FlashMode::Auto => FlashMode::Off,
            FlashMode::Torch => FlashMode::Off,
        }
    }

    /// Whether the LED has to be lit continuously
    pub fn is_torch(self) -> bool {
        matches!(self, FlashMode::Torch)
    }

    /// Whether the LED should fire around a still capture
    ///
    /// Backends without light metering treat `Auto` like `On`.
    pub fn fires_on_capture(self) -> bool {
        matches!(self, FlashMode::On | FlashMode::Auto)
    }
}

impl FromStr for FlashMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(FlashMode::Off),
            "on" => Ok(FlashMode::On),
            "auto" => Ok(FlashMode::Auto),
            "torch" => Ok(FlashMode::Torch),
            other => Err(format!("unknown flash mode '{}'", other)),
        }
    }
}

/// A flash LED discovered via sysfs
#[derive(Debug, Clone)]
pub struct FlashDevice {
    /// Sysfs path, e.g. `/sys/class/leds/white:flash`
    path: PathBuf,
    /// Value of the `max_brightness` file
    max_brightness: u32,
    /// Directory basename
    name: String,
}

impl FlashDevice {
    /// Get the device name (e.g. "white:flash")
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set raw brightness value (0 = off, max_brightness = full)
    pub fn set_brightness(&self, value: u32) -> io::Result<()> {
        let clamped = value.min(self.max_brightness);
        std::fs::write(self.path.join("brightness"), clamped.to_string())
    }

    /// Turn off the LED
    pub fn off(&self) -> io::Result<()> {
        self.set_brightness(0)
    }

    /// Turn on at a fraction of max brightness (0.0 = off, 1.0 = full)
    pub fn torch(&self, intensity: f32) -> io::Result<()> {
        let clamped = intensity.clamp(0.0, 1.0);
        let value = (clamped * self.max_brightness as f32).round() as u32;
        self.set_brightness(value)
    }

    fn probe(led_path: PathBuf, name: &str) -> Option<FlashDevice> {
        let max_brightness_path = led_path.join("max_brightness");
        let max_brightness = match std::fs::read_to_string(&max_brightness_path) {
            Ok(s) => match s.trim().parse::<u32>() {
                Ok(v) if v > 0 => v,
                _ => {
                    warn!(path = %max_brightness_path.display(), "Invalid max_brightness value");
                    return None;
                }
            },
            Err(e) => {
                warn!(path = %max_brightness_path.display(), error = %e, "Cannot read max_brightness");
                return None;
            }
        };

        let brightness_path = led_path.join("brightness");
        if let Err(e) = std::fs::OpenOptions::new()
            .write(true)
            .open(&brightness_path)
        {
            warn!(
                path = %brightness_path.display(),
                error = %e,
                "Flash LED found but brightness is not writable"
            );
            return None;
        }

        Some(FlashDevice {
            path: led_path,
            max_brightness,
            name: name.to_string(),
        })
    }
}

/// The set of controllable flash LEDs on this machine
#[derive(Debug, Clone, Default)]
pub struct FlashLeds {
    devices: Vec<FlashDevice>,
}

impl FlashLeds {
    /// Scan the default sysfs LED directory
    pub fn discover() -> Self {
        Self::discover_in(Path::new(SYSFS_LEDS_DIR))
    }

    /// Scan `leds_dir` for entries named `*:flash` that we can write to
    pub fn discover_in(leds_dir: &Path) -> Self {
        let Ok(entries) = std::fs::read_dir(leds_dir) else {
            debug!(dir = %leds_dir.display(), "Cannot read LED directory, flash discovery skipped");
            return Self::default();
        };

        let mut devices: Vec<FlashDevice> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                if !name.ends_with(":flash") {
                    return None;
                }
                FlashDevice::probe(entry.path(), name)
            })
            .collect();

        // white before yellow
        devices.sort_by(|a, b| a.name.cmp(&b.name));

        for device in &devices {
            info!(name = %device.name, max_brightness = device.max_brightness, "Discovered flash LED");
        }

        Self { devices }
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn devices(&self) -> &[FlashDevice] {
        &self.devices
    }

    /// Drive every LED to `intensity`, returning the first failure
    pub fn set_all(&self, intensity: f32) -> io::Result<()> {
        let mut first_error = None;
        for device in &self.devices {
            if let Err(e) = device.torch(intensity) {
                warn!(device = %device.name, error = %e, "Failed to drive flash LED");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Apply the continuous part of a flash mode (torch on, everything else off)
    pub fn apply(&self, mode: FlashMode) -> io::Result<()> {
        if mode.is_torch() {
            self.set_all(1.0)
        } else {
            self.set_all(0.0)
        }
    }
}
