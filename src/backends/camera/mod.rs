// SPDX-License-Identifier: GPL-3.0-only

//! Native session abstraction
//!
//! A [`NativeSession`] is the boundary between the controller and one
//! platform capture stack. The controller owns exactly one session, chosen
//! at construction time.
//!
//! ```text
//! ┌─────────────────────┐
//! │  CameraController   │  ← lifecycle, state, fan-out
//! └──────────┬──────────┘
//!            │ bind / reconfigure / capture / record / unbind
//!            ▼
//! ┌─────────────────────┐        SessionEvents
//! │  NativeSession      │ ──────────────────────► frames, failures
//! └──────────┬──────────┘
//!       ┌────┴─────┐
//!       ▼          ▼
//!   Virtual    GStreamer
//! ```
//!
//! Frames and asynchronous failures flow back through [`SessionEvents`],
//! which only holds a weak reference to the controller so a session thread
//! never keeps a released controller alive.

pub mod frame_loop;
#[cfg(feature = "gstreamer")]
pub mod gstreamer;
pub mod types;
pub mod virtual_session;

pub use types::*;
pub use virtual_session::{SessionOp, VirtualSession, VirtualSessionOptions};

use crate::config::{CameraLens, ImageFormat};
use crate::constants::VideoQuality;
use crate::errors::{SessionError, SessionResult};
use crate::flash::FlashMode;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

/// What a backend can do
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCapabilities {
    /// Still capture is possible while a recording runs
    pub simultaneous_still_and_video: bool,
    /// A flash or torch LED is present
    pub has_flash: bool,
    /// Upper bound for `Reconfigure::ZoomRatio`
    pub max_zoom_ratio: f32,
    /// Lenses this backend can bind
    pub lenses: Vec<CameraLens>,
    /// File extension of recordings (e.g. "mp4")
    pub video_container: &'static str,
}

/// Parameters for bringing a session up
#[derive(Debug, Clone, PartialEq)]
pub struct BindRequest {
    pub lens: CameraLens,
    pub flash_mode: FlashMode,
    pub video_quality: VideoQuality,
    pub target_fps: u32,
    pub enable_hdr: bool,
    /// Explicit device path from the host settings
    pub device: Option<String>,
}

/// A single change to a live session
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconfigure {
    Lens(CameraLens),
    FlashMode(FlashMode),
    ZoomRatio(f32),
}

/// Parameters for one still capture
#[derive(Debug, Clone, PartialEq)]
pub struct StillRequest {
    pub image_format: ImageFormat,
    pub flash_mode: FlashMode,
    pub jpeg_quality: u8,
}

/// What a backend hands back for a still capture
#[derive(Debug, Clone)]
pub enum StillCapture {
    /// Raw frame; the controller encodes it
    Frame(CameraFrame),
    /// Already encoded by the platform in the requested format
    Encoded {
        width: u32,
        height: u32,
        bytes: Arc<[u8]>,
    },
}

/// Parameters for starting a recording
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingRequest {
    /// Target file; `None` records without persisting
    pub output: Option<PathBuf>,
    pub video_quality: VideoQuality,
    pub target_fps: u32,
    pub record_audio: bool,
}

/// Result of stopping a recording
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingOutput {
    pub duration_ms: u64,
    pub output: Option<PathBuf>,
}

/// Receiver of session callbacks
///
/// Called from session threads. Implementations must not block.
pub trait SessionObserver: Send + Sync {
    fn on_frame(&self, frame: &CameraFrame);
    fn on_error(&self, error: SessionError);
}

/// Callback handle given to a session at bind time
#[derive(Clone)]
pub struct SessionEvents {
    observer: Weak<dyn SessionObserver>,
}

impl SessionEvents {
    pub fn new(observer: Weak<dyn SessionObserver>) -> Self {
        Self { observer }
    }

    /// Events that go nowhere (e.g. for sessions driven outside a controller)
    pub fn detached() -> Self {
        struct Nobody;
        impl SessionObserver for Nobody {
            fn on_frame(&self, _: &CameraFrame) {}
            fn on_error(&self, _: SessionError) {}
        }
        let observer: Weak<dyn SessionObserver> = Weak::<Nobody>::new();
        Self { observer }
    }

    /// Deliver a frame; false once the controller is gone
    pub fn frame(&self, frame: &CameraFrame) -> bool {
        match self.observer.upgrade() {
            Some(observer) => {
                observer.on_frame(frame);
                true
            }
            None => false,
        }
    }

    /// Report an asynchronous session failure
    pub fn error(&self, error: SessionError) {
        if let Some(observer) = self.observer.upgrade() {
            observer.on_error(error);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.observer.strong_count() == 0
    }
}

impl std::fmt::Debug for SessionEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEvents")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// One platform capture stack
///
/// Every operation except `unbind` may suspend. `unbind` is synchronous,
/// must tolerate being called on an unbound session, and swallows teardown
/// failures after logging them.
#[async_trait]
pub trait NativeSession: Send + Sync + 'static {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> SessionCapabilities;

    /// Open the device for `request.lens` and start delivering frames
    async fn bind(&self, request: BindRequest, events: SessionEvents) -> SessionResult<()>;

    /// Apply one change to the bound session
    async fn reconfigure(&self, change: Reconfigure) -> SessionResult<()>;

    /// Capture one still image
    async fn capture_still(&self, request: StillRequest) -> SessionResult<StillCapture>;

    async fn start_recording(&self, request: RecordingRequest) -> SessionResult<()>;

    /// Stop the active recording and finalize its output
    async fn stop_recording(&self) -> SessionResult<RecordingOutput>;

    /// Release every native resource
    fn unbind(&self);
}

/// Shorthand for the common not-bound error
pub(crate) fn not_ready<T>() -> SessionResult<T> {
    Err(SessionError::NotReady)
}
