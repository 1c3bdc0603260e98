// SPDX-License-Identifier: GPL-3.0-only

//! Desktop camera session over GStreamer
//!
//! - Preview frames come from a capture pipeline ending in an RGBA appsink
//! - Stills are the next frame after the request (after firing the flash)
//! - Recording pushes the same frames into an MP4 encoder pipeline
//! - Flash and torch drive sysfs LEDs
//!
//! Lenses map onto cameras in enumeration order (back first) unless the
//! settings pin a device path per lens.

mod pipeline;
mod recorder;

pub use pipeline::{discover_cameras, source_description};

use super::{
    BindRequest, CameraFrame, NativeSession, Reconfigure, RecordingOutput, RecordingRequest,
    SessionCapabilities, SessionEvents, StillCapture, StillRequest, not_ready,
};
use crate::config::{CameraLens, Settings};
use crate::constants::DEFAULT_ZOOM_RATIO;
use crate::constants::timing;
use crate::errors::{SessionError, SessionResult};
use crate::flash::{FlashLeds, FlashMode};
use async_trait::async_trait;
use pipeline::CapturePipeline;
use recorder::Recorder;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Time the sensor gets to adjust to the flash before the still is taken
const FLASH_SETTLE: Duration = Duration::from_millis(300);

struct Bound {
    pipeline: CapturePipeline,
    lens: CameraLens,
    flash_mode: FlashMode,
    target_fps: u32,
    events: SessionEvents,
}

struct Shared {
    init_error: Option<String>,
    cameras: Vec<String>,
    front_device: Option<String>,
    back_device: Option<String>,
    leds: FlashLeds,
    bound: Mutex<Option<Bound>>,
    last_frame: Mutex<Option<CameraFrame>>,
    recorder: Mutex<Option<Recorder>>,
}

/// Camera session backed by GStreamer pipelines
#[derive(Clone)]
pub struct GstSession {
    shared: Arc<Shared>,
}

impl Default for GstSession {
    fn default() -> Self {
        Self::new()
    }
}

impl GstSession {
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Session honoring the device paths pinned in `settings`
    pub fn from_settings(settings: &Settings) -> Self {
        Self::build(
            settings.front_device.clone(),
            settings.back_device.clone(),
        )
    }

    fn build(front_device: Option<String>, back_device: Option<String>) -> Self {
        let init_error = gstreamer::init().err().map(|e| e.to_string());
        let cameras = match &init_error {
            None => discover_cameras(),
            Some(e) => {
                warn!(error = %e, "GStreamer initialization failed");
                Vec::new()
            }
        };
        let leds = FlashLeds::discover();
        info!(
            cameras = cameras.len(),
            flash_leds = leds.devices().len(),
            "GStreamer session created"
        );
        Self {
            shared: Arc::new(Shared {
                init_error,
                cameras,
                front_device,
                back_device,
                leds,
                bound: Mutex::new(None),
                last_frame: Mutex::new(None),
                recorder: Mutex::new(None),
            }),
        }
    }
}

impl Shared {
    fn bound_lock(&self) -> MutexGuard<'_, Option<Bound>> {
        self.bound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn last_frame_lock(&self) -> MutexGuard<'_, Option<CameraFrame>> {
        self.last_frame.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn recorder_lock(&self) -> MutexGuard<'_, Option<Recorder>> {
        self.recorder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Device for `lens`: pinned path first, then enumeration order
    fn device_for(&self, lens: CameraLens) -> Option<Option<String>> {
        let pinned = match lens {
            CameraLens::Front => self.front_device.clone(),
            CameraLens::Back => self.back_device.clone(),
        };
        if pinned.is_some() {
            return Some(pinned);
        }
        let index = match lens {
            CameraLens::Back => 0,
            CameraLens::Front => 1,
        };
        match self.cameras.get(index) {
            Some(path) => Some(Some(path.clone())),
            // No enumeration at all: let autovideosrc pick the back camera
            None if self.cameras.is_empty() && lens == CameraLens::Back => Some(None),
            None => None,
        }
    }

    fn lenses(&self) -> Vec<CameraLens> {
        [CameraLens::Back, CameraLens::Front]
            .into_iter()
            .filter(|lens| self.device_for(*lens).is_some())
            .collect()
    }

    /// Start a capture pipeline on the device for `lens`; blocking
    fn open(
        self: &Arc<Self>,
        lens: CameraLens,
        device: Option<String>,
        fps: u32,
        events: &SessionEvents,
    ) -> SessionResult<CapturePipeline> {
        let weak: Weak<Shared> = Arc::downgrade(self);
        let frame_events = events.clone();
        let error_events = events.clone();
        info!(?lens, device = ?device, fps, "Opening camera");
        CapturePipeline::start(
            device.as_deref(),
            fps,
            move |frame| {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                *shared.last_frame_lock() = Some(frame.clone());
                if let Some(recorder) = shared.recorder_lock().as_ref() {
                    recorder.push(&frame);
                }
                frame_events.frame(&frame);
            },
            move |error| error_events.error(error),
        )
    }

    /// Wait for a frame captured after `after`
    async fn next_frame(&self, after: Instant, timeout: Duration) -> SessionResult<CameraFrame> {
        let deadline = Instant::now() + timeout;
        loop {
            let latest = self.last_frame_lock().clone();
            if let Some(frame) = latest
                && frame.captured_at >= after
            {
                return Ok(frame);
            }
            let bound = self.bound_lock().is_some();
            if !bound {
                return not_ready();
            }
            if Instant::now() >= deadline {
                return Err(SessionError::Busy("no frame from the camera".to_string()));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn restore_flash(&self) {
        let mode = self
            .bound_lock()
            .as_ref()
            .map(|b| b.flash_mode)
            .unwrap_or_default();
        if let Err(e) = self.leds.apply(mode) {
            warn!(error = %e, "Failed to restore flash LEDs");
        }
    }

    fn teardown(&self) {
        if let Some(recorder) = self.recorder_lock().take()
            && let Err(e) = recorder.stop()
        {
            warn!(error = %e, "Failed to finalize recording during unbind");
        }
        let bound = self.bound_lock().take();
        if let Some(bound) = bound {
            bound.pipeline.stop();
            info!(lens = ?bound.lens, "Camera unbound");
        }
        *self.last_frame_lock() = None;
        if let Err(e) = self.leds.set_all(0.0) {
            warn!(error = %e, "Failed to switch flash LEDs off");
        }
    }
}

async fn blocking<T: Send + 'static>(
    task: impl FnOnce() -> SessionResult<T> + Send + 'static,
) -> SessionResult<T> {
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| SessionError::Other(format!("GStreamer task failed: {}", e)))?
}

#[async_trait]
impl NativeSession for GstSession {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn capabilities(&self) -> SessionCapabilities {
        SessionCapabilities {
            simultaneous_still_and_video: true,
            has_flash: !self.shared.leds.is_empty(),
            max_zoom_ratio: DEFAULT_ZOOM_RATIO,
            lenses: self.shared.lenses(),
            video_container: "mp4",
        }
    }

    async fn bind(&self, request: BindRequest, events: SessionEvents) -> SessionResult<()> {
        if let Some(e) = &self.shared.init_error {
            return Err(SessionError::InitializationFailed(e.clone()));
        }
        if self.shared.bound_lock().is_some() {
            return Err(SessionError::Busy("session already bound".to_string()));
        }
        let device = match request.device.clone() {
            Some(device) => Some(device),
            None => self
                .shared
                .device_for(request.lens)
                .ok_or_else(|| SessionError::DeviceNotFound(format!("no {:?} camera", request.lens)))?,
        };

        let shared = Arc::clone(&self.shared);
        let lens = request.lens;
        let fps = request.target_fps;
        let pipeline = blocking(move || {
            let pipeline = shared.open(lens, device, fps, &events)?;
            Ok((pipeline, events))
        })
        .await;
        let (pipeline, events) = pipeline?;

        if let Err(e) = self.shared.leds.apply(request.flash_mode) {
            warn!(error = %e, "Failed to apply flash mode");
        }
        *self.shared.bound_lock() = Some(Bound {
            pipeline,
            lens,
            flash_mode: request.flash_mode,
            target_fps: fps,
            events,
        });
        info!(?lens, fps, hdr = request.enable_hdr, "GStreamer camera bound");
        Ok(())
    }

    async fn reconfigure(&self, change: Reconfigure) -> SessionResult<()> {
        match change {
            Reconfigure::Lens(lens) => {
                let (fps, events) = match self.shared.bound_lock().as_ref() {
                    Some(bound) => (bound.target_fps, bound.events.clone()),
                    None => return not_ready(),
                };
                let device = self
                    .shared
                    .device_for(lens)
                    .ok_or_else(|| SessionError::DeviceNotFound(format!("no {:?} camera", lens)))?;

                let shared = Arc::clone(&self.shared);
                blocking(move || {
                    let Some(previous) = shared.bound_lock().take() else {
                        return not_ready();
                    };
                    let previous_lens = previous.lens;
                    let flash_mode = previous.flash_mode;
                    // Release the current device before opening the next one
                    previous.pipeline.stop();
                    *shared.last_frame_lock() = None;
                    match shared.open(lens, device, fps, &events) {
                        Ok(pipeline) => {
                            *shared.bound_lock() = Some(Bound {
                                pipeline,
                                lens,
                                flash_mode,
                                target_fps: fps,
                                events,
                            });
                            debug!(?previous_lens, ?lens, "Switched camera");
                            Ok(())
                        }
                        Err(e) => {
                            events.error(SessionError::Disconnected(format!(
                                "camera lost while switching to {:?}",
                                lens
                            )));
                            Err(e)
                        }
                    }
                })
                .await
            }
            Reconfigure::FlashMode(mode) => {
                if self.shared.leds.is_empty() && mode != FlashMode::Off {
                    return Err(SessionError::Unsupported("no flash LED found".to_string()));
                }
                let mut bound = self.shared.bound_lock();
                let Some(bound) = bound.as_mut() else {
                    return not_ready();
                };
                self.shared.leds.apply(mode)?;
                bound.flash_mode = mode;
                Ok(())
            }
            Reconfigure::ZoomRatio(ratio) => {
                if ratio > DEFAULT_ZOOM_RATIO {
                    return Err(SessionError::Unsupported("zoom".to_string()));
                }
                Ok(())
            }
        }
    }

    async fn capture_still(&self, request: StillRequest) -> SessionResult<StillCapture> {
        if self.shared.bound_lock().is_none() {
            return not_ready();
        }
        let flash = request.flash_mode.fires_on_capture() && !self.shared.leds.is_empty();
        if flash {
            if let Err(e) = self.shared.leds.set_all(1.0) {
                warn!(error = %e, "Failed to fire flash");
            }
            tokio::time::sleep(FLASH_SETTLE).await;
        }

        let requested = Instant::now();
        let result = self
            .shared
            .next_frame(requested, Duration::from_secs(timing::START_TIMEOUT_SECS))
            .await;
        if flash {
            self.shared.restore_flash();
        }
        let frame = result?;
        debug!(
            width = frame.width,
            height = frame.height,
            flash,
            "Still frame captured"
        );
        Ok(StillCapture::Frame(frame))
    }

    async fn start_recording(&self, request: RecordingRequest) -> SessionResult<()> {
        if self.shared.recorder_lock().is_some() {
            return Err(SessionError::RecordingInProgress);
        }
        let recent = Instant::now()
            .checked_sub(Duration::from_secs(1))
            .unwrap_or_else(Instant::now);
        let frame = self
            .shared
            .next_frame(recent, Duration::from_secs(timing::START_TIMEOUT_SECS))
            .await?;

        let recorder = blocking(move || Recorder::start(&request, frame.width, frame.height)).await?;
        let mut slot = self.shared.recorder_lock();
        if slot.is_some() {
            return Err(SessionError::RecordingInProgress);
        }
        *slot = Some(recorder);
        Ok(())
    }

    async fn stop_recording(&self) -> SessionResult<RecordingOutput> {
        let recorder = self
            .shared
            .recorder_lock()
            .take()
            .ok_or(SessionError::NoRecordingInProgress)?;
        blocking(move || recorder.stop()).await
    }

    fn unbind(&self) {
        self.shared.teardown();
    }
}
