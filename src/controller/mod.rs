// SPDX-License-Identifier: GPL-3.0-only

//! Camera controller
//!
//! [`CameraController`] is the one contract hosts program against. The
//! implementation, [`SessionController`], drives a [`NativeSession`] chosen
//! when the controller is built; [`platform_controller`] picks the session
//! for the current build.
//!
//! [`NativeSession`]: crate::backends::camera::NativeSession

pub mod listeners;
mod recording;
mod session_controller;

pub use listeners::{FrameListener, FrameListenerRegistry};
pub use recording::VideoRecording;
pub use session_controller::{ControllerBuilder, SessionController};

use crate::config::{CameraConfiguration, CameraLens, Settings};
use crate::errors::CameraException;
use crate::flash::FlashMode;
use crate::permissions::PermissionManager;
use crate::pipelines::ImageCaptureResult;
use crate::state::CameraState;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle, live state, capture and frame fan-out of one camera
#[async_trait]
pub trait CameraController: Send + Sync {
    /// Bring the native session up
    ///
    /// Moves `Initializing` to `Ready` or to `Error`. Calling again while
    /// Ready does nothing; calling after a failure returns the recorded
    /// error without touching the device.
    async fn initialize(&self) -> Result<(), CameraException>;

    /// Tear everything down; idempotent and infallible
    fn release(&self);

    fn state(&self) -> CameraState;

    /// Receiver that sees the current state immediately
    fn subscribe_state(&self) -> watch::Receiver<CameraState>;

    /// Configuration as last applied to the session
    fn configuration(&self) -> CameraConfiguration;

    async fn set_lens(&self, lens: CameraLens) -> Result<(), CameraException>;

    async fn set_flash_mode(&self, mode: FlashMode) -> Result<(), CameraException>;

    /// Clamped to `[1.0, max_zoom_ratio]` of the backend
    async fn set_zoom_ratio(&self, ratio: f32) -> Result<(), CameraException>;

    /// Capture one still; a concurrent call fails with `CaptureFailed`
    async fn take_picture(&self) -> ImageCaptureResult;

    async fn start_recording(&self) -> Result<VideoRecording, CameraException>;

    /// Called once per frame while Ready
    fn add_frame_listener(&self, listener: Arc<dyn FrameListener>);

    fn remove_frame_listener(&self, listener: &Arc<dyn FrameListener>);

    /// The registry behind `add_frame_listener`
    fn frame_listeners(&self) -> Arc<FrameListenerRegistry>;
}

/// Controller over the native session of this build
///
/// GStreamer when compiled with the `gstreamer` feature, the synthetic
/// virtual session otherwise.
pub fn platform_controller(
    configuration: CameraConfiguration,
    settings: Settings,
) -> Arc<dyn CameraController> {
    let permissions = PermissionManager::for_desktop(&settings);

    #[cfg(feature = "gstreamer")]
    let session = crate::backends::camera::gstreamer::GstSession::from_settings(&settings);
    #[cfg(not(feature = "gstreamer"))]
    let session = crate::backends::camera::VirtualSession::default();

    Arc::new(
        ControllerBuilder::new(session)
            .configuration(configuration)
            .settings(settings)
            .permissions(permissions)
            .build(),
    )
}
