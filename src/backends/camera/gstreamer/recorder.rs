// SPDX-License-Identifier: GPL-3.0-only

//! MP4 recorder fed from captured frames
//!
//! ```text
//! appsrc (RGBA) → videoconvert → videoscale → x264enc → h264parse ─┐
//!                                                                 mp4mux → filesink
//! autoaudiosrc → audioconvert → audioresample → avenc_aac ─────────┘
//! ```
//!
//! Frames are pushed by the capture pipeline's streaming thread, so the
//! preview keeps running while recording. Audio is best effort: when the
//! audio branch cannot be built the recording continues without it.

use crate::backends::camera::{CameraFrame, RecordingOutput, RecordingRequest};
use crate::constants::timing;
use crate::errors::{SessionError, SessionResult};
use crate::pipelines::EncoderSettings;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use gstreamer_video::{VideoFormat, VideoInfo};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct Recorder {
    pipeline: gst::Pipeline,
    appsrc: AppSrc,
    output: Option<PathBuf>,
    width: u32,
    height: u32,
    started_at: Instant,
    frames: AtomicU64,
}

impl Recorder {
    /// Build and start a recorder for frames of `width`x`height`
    pub fn start(request: &RecordingRequest, width: u32, height: u32) -> SessionResult<Self> {
        let settings = EncoderSettings::for_quality(request.video_quality, request.target_fps);
        let (out_width, out_height) = fit_within(width, height, settings.width, settings.height);
        info!(
            width,
            height,
            out_width,
            out_height,
            bitrate_kbps = settings.bitrate_kbps,
            fps = settings.fps,
            output = ?request.output,
            audio = request.record_audio,
            "Creating recorder"
        );

        let pipeline = if request.record_audio {
            match launch(&settings, out_width, out_height, request.output.is_some(), true) {
                Ok(pipeline) => pipeline,
                Err(e) => {
                    warn!(error = %e, "Audio branch unavailable, recording video only");
                    launch(&settings, out_width, out_height, request.output.is_some(), false)?
                }
            }
        } else {
            launch(&settings, out_width, out_height, request.output.is_some(), false)?
        };

        if let Some(path) = &request.output {
            let sink = pipeline
                .by_name("filesink")
                .ok_or_else(|| SessionError::InitializationFailed("no filesink".to_string()))?;
            sink.set_property("location", path.to_string_lossy().to_string());
        }

        let appsrc = pipeline
            .by_name("src")
            .ok_or_else(|| SessionError::InitializationFailed("no appsrc".to_string()))?
            .dynamic_cast::<AppSrc>()
            .map_err(|_| SessionError::InitializationFailed("src is not an appsrc".to_string()))?;
        let caps = VideoInfo::builder(VideoFormat::Rgba, width, height)
            .fps(gst::Fraction::new(settings.fps as i32, 1))
            .build()
            .and_then(|info| info.to_caps())
            .map_err(|e| SessionError::InitializationFailed(e.to_string()))?;
        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gst::Format::Time);
        appsrc.set_is_live(true);

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| SessionError::InitializationFailed(format!("Failed to start recording: {}", e)))?;

        // Surface immediate failures (missing encoder, unwritable file)
        if let Some(bus) = pipeline.bus()
            && let Some(msg) = bus.timed_pop_filtered(
                gst::ClockTime::from_mseconds(200),
                &[gst::MessageType::Error],
            )
            && let gst::MessageView::Error(err) = msg.view()
        {
            error!(
                error = %err.error(),
                debug = ?err.debug(),
                source = ?err.src().map(|s| s.name()),
                "GStreamer error during recording start"
            );
            let _ = pipeline.set_state(gst::State::Null);
            return Err(SessionError::InitializationFailed(format!(
                "Recording start error: {}",
                err.error()
            )));
        }

        Ok(Self {
            pipeline,
            appsrc,
            output: request.output.clone(),
            width,
            height,
            started_at: Instant::now(),
            frames: AtomicU64::new(0),
        })
    }

    /// Queue one frame; frames of a different size are skipped
    pub fn push(&self, frame: &CameraFrame) {
        if frame.width != self.width || frame.height != self.height {
            debug!(
                width = frame.width,
                height = frame.height,
                "Skipping frame with changed size"
            );
            return;
        }

        let mut buffer = gst::Buffer::from_slice(packed_rows(frame));
        if let Some(buffer) = buffer.get_mut() {
            let pts = frame.captured_at.saturating_duration_since(self.started_at);
            buffer.set_pts(gst::ClockTime::from_nseconds(pts.as_nanos() as u64));
        }
        match self.appsrc.push_buffer(buffer) {
            Ok(_) => {
                let frames = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
                if frames % timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(frames, "Recording frames queued");
                }
            }
            Err(e) => debug!(error = ?e, "Recorder rejected frame"),
        }
    }

    /// Send EOS, wait for the muxer to finalize, then tear down
    ///
    /// Blocks for up to the finalize timeout.
    pub fn stop(self) -> SessionResult<RecordingOutput> {
        let duration_ms = self.started_at.elapsed().as_millis() as u64;
        info!(frames = self.frames.load(Ordering::Relaxed), "Stopping recording");

        if !self.pipeline.send_event(gst::event::Eos::new()) {
            warn!("Failed to send EOS event to recorder");
        }

        let mut failure = None;
        if let Some(bus) = self.pipeline.bus() {
            match bus.timed_pop_filtered(
                gst::ClockTime::from_seconds(timing::RECORDING_FINALIZE_TIMEOUT_SECS),
                &[gst::MessageType::Eos, gst::MessageType::Error],
            ) {
                Some(msg) => {
                    if let gst::MessageView::Error(err) = msg.view() {
                        error!(error = %err.error(), "Recorder failed while finalizing");
                        failure = Some(SessionError::Encoding(err.error().to_string()));
                    }
                }
                None => warn!("Recorder did not finalize in time, output may be truncated"),
            }
        }

        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| SessionError::Other(format!("Failed to stop recorder: {}", e)))?;

        if let Some(err) = failure {
            return Err(err);
        }
        if let Some(path) = &self.output {
            info!(path = %path.display(), duration_ms, "Recording saved");
        }
        Ok(RecordingOutput {
            duration_ms,
            output: self.output.clone(),
        })
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

fn launch(
    settings: &EncoderSettings,
    width: u32,
    height: u32,
    persist: bool,
    audio: bool,
) -> SessionResult<gst::Pipeline> {
    let sink = if persist {
        "filesink name=filesink"
    } else {
        "fakesink"
    };
    let mut description = format!(
        "appsrc name=src do-timestamp=false ! queue ! videoconvert ! videoscale ! \
         video/x-raw,format=I420,width={},height={} ! \
         x264enc bitrate={} key-int-max={} speed-preset=veryfast tune=zerolatency ! \
         h264parse ! mp4mux name=mux ! {}",
        width, height, settings.bitrate_kbps, settings.keyframe_interval, sink
    );
    if audio {
        description.push_str(
            " autoaudiosrc ! queue ! audioconvert ! audioresample ! avenc_aac ! aacparse ! mux.",
        );
    }
    debug!(pipeline = %description, "Launching recorder pipeline");

    gst::parse::launch(&description)
        .map_err(|e| SessionError::InitializationFailed(e.to_string()))?
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| SessionError::InitializationFailed("not a pipeline".to_string()))
}

/// Largest even size with the source aspect that fits the target box
fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (max_width & !1, max_height & !1);
    }
    let scale = (max_width as f64 / width as f64)
        .min(max_height as f64 / height as f64)
        .min(1.0);
    let w = ((width as f64 * scale) as u32).max(2) & !1;
    let h = ((height as f64 * scale) as u32).max(2) & !1;
    (w, h)
}

/// Frame data with row padding removed
fn packed_rows(frame: &CameraFrame) -> Vec<u8> {
    let row = (frame.width * frame.format.bytes_per_pixel()) as usize;
    let stride = frame.stride as usize;
    if stride == row {
        return frame.data[..row * frame.height as usize].to_vec();
    }
    let mut packed = Vec::with_capacity(row * frame.height as usize);
    for y in 0..frame.height as usize {
        packed.extend_from_slice(&frame.data[y * stride..y * stride + row]);
    }
    packed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_within_keeps_aspect() {
        assert_eq!(fit_within(1280, 720, 1920, 1080), (1280, 720));
        assert_eq!(fit_within(3840, 2160, 1920, 1080), (1920, 1080));
        assert_eq!(fit_within(640, 480, 320, 240), (320, 240));
        assert_eq!(fit_within(1001, 1001, 500, 500), (500, 500));
    }
}
