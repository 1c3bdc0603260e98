// SPDX-License-Identifier: GPL-3.0-only

//! Capture pipeline: camera source decoded to RGBA frames on an appsink

use crate::backends::camera::{CameraFrame, PixelFormat};
use crate::constants::timing;
use crate::errors::{SessionError, SessionResult};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Build the gst-launch fragment for a device identifier
///
/// - empty / `None`: the platform default source
/// - `/dev/videoN`: V4L2 device node
/// - `pipewire-serial-N` / `pipewire-NAME`: PipeWire node
pub fn source_description(device: Option<&str>) -> String {
    match device {
        None | Some("") => {
            info!("Using default video source");
            "autovideosrc".to_string()
        }
        Some(path) if path.starts_with("pipewire-serial-") => {
            let serial = path.trim_start_matches("pipewire-serial-");
            info!(serial, "Using PipeWire object serial");
            format!("pipewiresrc target-object={} do-timestamp=true", serial)
        }
        Some(path) if path.starts_with("pipewire-") => {
            let node = path.trim_start_matches("pipewire-");
            info!(node, "Using PipeWire node name");
            format!("pipewiresrc target-object={} do-timestamp=true", node)
        }
        Some(path) => {
            if !path.starts_with("/dev/video") {
                warn!(path, "Unknown device path format, trying V4L2");
            }
            format!("v4l2src device={}", path)
        }
    }
}

/// Video device nodes reported by the GStreamer device monitor, in
/// enumeration order
pub fn discover_cameras() -> Vec<String> {
    let monitor = gst::DeviceMonitor::new();
    monitor.add_filter(Some("Video/Source"), None);
    if let Err(e) = monitor.start() {
        warn!(error = %e, "Device monitor unavailable");
        return Vec::new();
    }

    let mut paths = Vec::new();
    for device in monitor.devices() {
        let Some(props) = device.properties() else {
            continue;
        };
        let path = props
            .get::<String>("api.v4l2.path")
            .or_else(|_| props.get::<String>("device.path"));
        match path {
            Ok(path) if !paths.contains(&path) => {
                debug!(name = %device.display_name(), path = %path, "Found camera");
                paths.push(path);
            }
            Ok(_) => {}
            Err(_) => debug!(name = %device.display_name(), "Camera without a device path"),
        }
    }
    monitor.stop();

    info!(count = paths.len(), "Camera enumeration complete");
    paths
}

type FrameCallback = Box<dyn Fn(CameraFrame) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(SessionError) + Send + Sync>;

/// Running capture pipeline
///
/// Frames arrive on the GStreamer streaming thread; the callback must not
/// block.
pub struct CapturePipeline {
    pipeline: gst::Pipeline,
    appsink: AppSink,
}

impl CapturePipeline {
    pub fn start(
        device: Option<&str>,
        fps: u32,
        on_frame: impl Fn(CameraFrame) + Send + Sync + 'static,
        on_error: impl Fn(SessionError) + Send + Sync + 'static,
    ) -> SessionResult<Self> {
        let description = format!(
            "{} ! decodebin ! videoconvert ! videorate drop-only=true ! \
             video/x-raw,format=RGBA,framerate={}/1 ! \
             appsink name=sink sync=false max-buffers=2 drop=true",
            source_description(device),
            fps.max(1)
        );
        info!(pipeline = %description, "Launching capture pipeline");

        let pipeline = gst::parse::launch(&description)
            .map_err(|e| SessionError::InitializationFailed(e.to_string()))?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| SessionError::InitializationFailed("not a pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| SessionError::InitializationFailed("no appsink".to_string()))?
            .dynamic_cast::<AppSink>()
            .map_err(|_| SessionError::InitializationFailed("sink is not an appsink".to_string()))?;

        let on_frame: FrameCallback = Box::new(on_frame);
        let counter = Arc::new(AtomicU64::new(0));
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sequence = counter.fetch_add(1, Ordering::Relaxed) + 1;
                    let Some(frame) = pull_frame(appsink, sequence)? else {
                        return Ok(gst::FlowSuccess::Ok);
                    };
                    if sequence % timing::FRAME_LOG_INTERVAL == 0 {
                        debug!(
                            frame = sequence,
                            width = frame.width,
                            height = frame.height,
                            "Capture pipeline frames"
                        );
                    }
                    on_frame(frame);
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        let on_error: ErrorCallback = Box::new(on_error);
        if let Some(bus) = pipeline.bus() {
            bus.set_sync_handler(move |_, msg| {
                if let gst::MessageView::Error(err) = msg.view() {
                    error!(
                        error = %err.error(),
                        debug = ?err.debug(),
                        source = ?err.src().map(|s| s.name()),
                        "Capture pipeline error"
                    );
                    on_error(SessionError::Disconnected(err.error().to_string()));
                }
                gst::BusSyncReply::Drop
            });
        }

        pipeline.set_state(gst::State::Playing).map_err(|e| {
            let _ = pipeline.set_state(gst::State::Null);
            SessionError::InitializationFailed(format!("Failed to start pipeline: {}", e))
        })?;

        let (result, state, pending) =
            pipeline.state(gst::ClockTime::from_seconds(timing::START_TIMEOUT_SECS));
        debug!(?result, ?state, ?pending, "Capture pipeline state");
        match result {
            Ok(_) if state == gst::State::Playing || pending == gst::State::Playing => {}
            _ => {
                let _ = pipeline.set_state(gst::State::Null);
                return Err(SessionError::InitializationFailed(format!(
                    "pipeline did not reach PLAYING (state: {:?})",
                    state
                )));
            }
        }

        info!("Capture pipeline running");
        Ok(Self { pipeline, appsink })
    }

    /// Stop the pipeline and release the device
    pub fn stop(self) {
        self.shutdown();
    }

    fn shutdown(&self) {
        self.appsink
            .set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());
        if let Some(bus) = self.pipeline.bus() {
            bus.unset_sync_handler();
        }
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(error = %e, "Failed to stop capture pipeline");
            return;
        }
        let (result, state, _) = self
            .pipeline
            .state(gst::ClockTime::from_seconds(timing::STOP_TIMEOUT_SECS));
        match result {
            Ok(_) => info!(?state, "Capture pipeline stopped"),
            Err(e) => debug!(error = ?e, ?state, "Capture pipeline state change had issues"),
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        if self.pipeline.current_state() != gst::State::Null {
            self.shutdown();
        }
    }
}

/// Next RGBA frame; `None` for buffers that are skipped
fn pull_frame(appsink: &AppSink, sequence: u64) -> Result<Option<CameraFrame>, gst::FlowError> {
    let started = Instant::now();
    let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
    if buffer.flags().contains(gst::BufferFlags::CORRUPTED) {
        debug!(frame = sequence, "Skipping corrupted buffer");
        return Ok(None);
    }
    let caps = sample.caps().ok_or(gst::FlowError::Error)?;
    let info = VideoInfo::from_caps(caps).map_err(|_| gst::FlowError::NotNegotiated)?;
    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;

    let stride = info.stride()[0].max(0) as u32;
    let frame = match CameraFrame::new(
        info.width(),
        info.height(),
        stride,
        PixelFormat::Rgba,
        Arc::<[u8]>::from(map.as_slice()),
    ) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(frame = sequence, error = %e, "Dropping malformed frame");
            return Ok(None);
        }
    };

    let mut frame = frame.with_sequence(sequence);
    frame.captured_at = started;
    Ok(Some(frame))
}
