// SPDX-License-Identifier: GPL-3.0-only

//! crosscam - one camera contract over interchangeable native sessions
//!
//! A host builds an immutable [`CameraConfiguration`], checks permissions
//! with a [`PermissionManager`], and drives a [`CameraController`]:
//! initialize, watch [`CameraState`], take pictures, record video. Frames
//! fan out to [`CameraPlugin`]s such as the [`BarcodeScanner`], each of
//! which publishes its own latest-value detection stream.
//!
//! # Modules
//!
//! - [`config`]: capture configuration and persisted host settings
//! - [`permissions`]: tri-state permission model and request protocol
//! - [`controller`]: the controller contract and its session-backed implementation
//! - [`backends`]: native sessions (virtual, GStreamer)
//! - [`pipelines`]: photo encoding and recording results
//! - [`plugins`]: frame fan-out, barcode and text detection
//! - [`state`]: camera state machine and its broadcast stream
//!
//! # Example
//!
//! ```no_run
//! use crosscam::{CameraConfiguration, CameraController, Settings, platform_controller};
//!
//! # async fn run() -> Result<(), crosscam::CameraException> {
//! let controller = platform_controller(CameraConfiguration::default(), Settings::default());
//! controller.initialize().await?;
//! let photo = controller.take_picture().await;
//! println!("{:?}", photo.path());
//! controller.release();
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod controller;
pub mod errors;
pub mod flash;
pub mod permissions;
pub mod pipelines;
pub mod plugins;
pub mod state;

// Re-export commonly used types
pub use config::{CameraConfiguration, CameraLens, Directory, ImageFormat, Settings};
pub use constants::VideoQuality;
pub use controller::{
    CameraController, ControllerBuilder, FrameListener, SessionController, VideoRecording,
    platform_controller,
};
pub use errors::{CameraException, SessionError};
pub use flash::FlashMode;
pub use permissions::{CameraPermission, PermissionManager, PermissionResult, PermissionStatus};
pub use pipelines::{CaptureOutput, ImageCaptureResult, PhotoTarget, VideoRecordingResult};
pub use plugins::{BarcodeScanner, CameraPlugin, TextRecognizer};
pub use state::{CameraState, ReadyState, state_stream};
