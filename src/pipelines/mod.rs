// SPDX-License-Identifier: GPL-3.0-only

//! Capture output pipelines
//!
//! - [`photo`]: encode stills and deliver them to disk or memory
//! - [`video`]: recording results and encoder presets

pub mod photo;
pub mod video;

pub use photo::{CaptureOutput, ImageCaptureResult, PhotoEncoder, PhotoTarget};
pub use video::{EncoderSettings, VideoRecordingResult};
