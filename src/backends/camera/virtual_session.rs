// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic camera session
//!
//! Produces a moving test pattern at the target frame rate without any
//! hardware. Frames can also be injected by hand and failures scripted, so
//! the same backend serves demos on machines without a camera and
//! deterministic tests of the controller.
//!
//! Recordings are written as monochrome YUV4MPEG2 streams, which any
//! ffmpeg-based player understands without an encoder dependency.

use super::frame_loop::{FrameLoop, LoopAction};
use super::{
    BindRequest, CameraFrame, NativeSession, PixelFormat, Reconfigure, RecordingOutput,
    RecordingRequest, SessionCapabilities, SessionEvents, StillCapture, StillRequest, not_ready,
};
use crate::config::CameraLens;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::{SessionError, SessionResult};
use crate::flash::FlashMode;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Tunables for a [`VirtualSession`]
#[derive(Debug, Clone)]
pub struct VirtualSessionOptions {
    /// Lenses that can be bound; others fail with `DeviceNotFound`
    pub lenses: Vec<CameraLens>,
    pub simultaneous_still_and_video: bool,
    pub has_flash: bool,
    pub max_zoom_ratio: f32,
    /// Generated frame size (width, height)
    pub frame_size: (u32, u32),
    /// Generate frames on a background loop at the target frame rate
    pub autoplay: bool,
    /// Artificial latency of every still capture
    pub capture_delay: Duration,
}

impl Default for VirtualSessionOptions {
    fn default() -> Self {
        Self {
            lenses: vec![CameraLens::Back, CameraLens::Front],
            simultaneous_still_and_video: false,
            has_flash: true,
            max_zoom_ratio: 8.0,
            frame_size: (640, 480),
            autoplay: true,
            capture_delay: Duration::ZERO,
        }
    }
}

impl VirtualSessionOptions {
    /// Options for tests: no background loop, frames only via `push_frame`
    pub fn manual() -> Self {
        Self {
            autoplay: false,
            frame_size: (64, 48),
            ..Self::default()
        }
    }
}

/// Operations whose next call can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionOp {
    Bind,
    Reconfigure,
    Capture,
    StartRecording,
    StopRecording,
}

struct Bound {
    lens: CameraLens,
    flash_mode: FlashMode,
    zoom_ratio: f32,
    target_fps: u32,
    events: SessionEvents,
}

struct ActiveRecording {
    started_at: Instant,
    output: Option<PathBuf>,
    writer: Option<Y4mWriter>,
    frames: u64,
}

#[derive(Default)]
struct SessionState {
    bound: Option<Bound>,
    recording: Option<ActiveRecording>,
    last_frame: Option<CameraFrame>,
    scripted: HashMap<SessionOp, SessionError>,
}

struct Shared {
    options: VirtualSessionOptions,
    state: Mutex<SessionState>,
    frame_loop: Mutex<Option<FrameLoop>>,
    sequence: AtomicU64,
    bind_count: AtomicU64,
    unbind_count: AtomicU64,
    delivered: AtomicU64,
}

/// Session that synthesizes frames in software
///
/// Cloning yields another handle to the same session, so a test can keep
/// one while a controller owns the other.
#[derive(Clone)]
pub struct VirtualSession {
    shared: Arc<Shared>,
}

impl Default for VirtualSession {
    fn default() -> Self {
        Self::new(VirtualSessionOptions::default())
    }
}

impl VirtualSession {
    pub fn new(options: VirtualSessionOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                options,
                state: Mutex::new(SessionState::default()),
                frame_loop: Mutex::new(None),
                sequence: AtomicU64::new(0),
                bind_count: AtomicU64::new(0),
                unbind_count: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
            }),
        }
    }

    /// Make the next call of `op` fail with `error`
    pub fn fail_next(&self, op: SessionOp, error: SessionError) {
        self.shared.lock().scripted.insert(op, error);
    }

    /// Report an asynchronous failure as a running device would
    pub fn fail(&self, error: SessionError) {
        let events = self.shared.lock().bound.as_ref().map(|b| b.events.clone());
        match events {
            Some(events) => events.error(error),
            None => debug!(error = %error, "Ignoring failure on unbound virtual session"),
        }
    }

    /// Deliver `frame` as if the device produced it
    ///
    /// Returns false when the session is not bound.
    pub fn push_frame(&self, frame: CameraFrame) -> bool {
        let sequence = self.shared.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.deliver(frame.with_sequence(sequence))
    }

    pub fn is_bound(&self) -> bool {
        self.shared.lock().bound.is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.shared.lock().recording.is_some()
    }

    pub fn current_lens(&self) -> Option<CameraLens> {
        self.shared.lock().bound.as_ref().map(|b| b.lens)
    }

    pub fn current_flash_mode(&self) -> Option<FlashMode> {
        self.shared.lock().bound.as_ref().map(|b| b.flash_mode)
    }

    pub fn current_zoom_ratio(&self) -> Option<f32> {
        self.shared.lock().bound.as_ref().map(|b| b.zoom_ratio)
    }

    pub fn bind_count(&self) -> u64 {
        self.shared.bind_count.load(Ordering::SeqCst)
    }

    pub fn unbind_count(&self) -> u64 {
        self.shared.unbind_count.load(Ordering::SeqCst)
    }

    /// Frames handed to the controller so far
    pub fn frames_delivered(&self) -> u64 {
        self.shared.delivered.load(Ordering::SeqCst)
    }

    fn take_scripted(&self, op: SessionOp) -> SessionResult<()> {
        match self.shared.lock().scripted.remove(&op) {
            Some(error) => {
                debug!(?op, error = %error, "Scripted virtual session failure");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn start_loop(&self, fps: u32) -> SessionResult<()> {
        let shared = Arc::clone(&self.shared);
        let frame_loop = FrameLoop::start("virtual-camera", fps, move |_| {
            let sequence = shared.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            let Some(lens) = shared.lock().bound.as_ref().map(|b| b.lens) else {
                return LoopAction::Stop;
            };
            let (width, height) = shared.options.frame_size;
            let frame = test_pattern(width, height, lens, sequence).with_sequence(sequence);
            if shared.deliver(frame) {
                LoopAction::Continue
            } else {
                LoopAction::Stop
            }
        })?;
        *self
            .shared
            .frame_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(frame_loop);
        Ok(())
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record and forward one frame; the state lock is not held while the
    /// controller runs its listeners
    fn deliver(&self, frame: CameraFrame) -> bool {
        let events = {
            let mut state = self.lock();
            let Some(events) = state.bound.as_ref().map(|b| b.events.clone()) else {
                return false;
            };
            if let Some(recording) = state.recording.as_mut() {
                recording.frames += 1;
                if let Some(writer) = recording.writer.as_mut()
                    && let Err(e) = writer.write_frame(&frame)
                {
                    warn!(error = %e, "Dropping virtual recording output after write failure");
                    recording.writer = None;
                }
            }
            state.last_frame = Some(frame.clone());
            events
        };

        let delivered = self.delivered.fetch_add(1, Ordering::Relaxed) + 1;
        if delivered % FRAME_LOG_INTERVAL == 0 {
            trace!(delivered, sequence = frame.sequence, "Virtual session frames");
        }
        events.frame(&frame)
    }
}

#[async_trait]
impl NativeSession for VirtualSession {
    fn name(&self) -> &'static str {
        "virtual"
    }

    fn capabilities(&self) -> SessionCapabilities {
        let options = &self.shared.options;
        SessionCapabilities {
            simultaneous_still_and_video: options.simultaneous_still_and_video,
            has_flash: options.has_flash,
            max_zoom_ratio: options.max_zoom_ratio,
            lenses: options.lenses.clone(),
            video_container: "y4m",
        }
    }

    async fn bind(&self, request: BindRequest, events: SessionEvents) -> SessionResult<()> {
        self.take_scripted(SessionOp::Bind)?;
        if !self.shared.options.lenses.contains(&request.lens) {
            return Err(SessionError::DeviceNotFound(format!(
                "no virtual {:?} camera",
                request.lens
            )));
        }

        {
            let mut state = self.shared.lock();
            if state.bound.is_some() {
                return Err(SessionError::Busy("session already bound".to_string()));
            }
            state.bound = Some(Bound {
                lens: request.lens,
                flash_mode: request.flash_mode,
                zoom_ratio: crate::constants::DEFAULT_ZOOM_RATIO,
                target_fps: request.target_fps,
                events,
            });
        }
        self.shared.bind_count.fetch_add(1, Ordering::SeqCst);

        info!(
            lens = ?request.lens,
            fps = request.target_fps,
            autoplay = self.shared.options.autoplay,
            "Virtual camera bound"
        );

        if self.shared.options.autoplay
            && let Err(e) = self.start_loop(request.target_fps)
        {
            self.shared.lock().bound = None;
            return Err(SessionError::InitializationFailed(e.to_string()));
        }
        Ok(())
    }

    async fn reconfigure(&self, change: Reconfigure) -> SessionResult<()> {
        if !self.is_bound() {
            return not_ready();
        }
        self.take_scripted(SessionOp::Reconfigure)?;

        let mut state = self.shared.lock();
        let Some(bound) = state.bound.as_mut() else {
            return not_ready();
        };
        match change {
            Reconfigure::Lens(lens) => {
                if !self.shared.options.lenses.contains(&lens) {
                    return Err(SessionError::DeviceNotFound(format!(
                        "no virtual {:?} camera",
                        lens
                    )));
                }
                bound.lens = lens;
                bound.zoom_ratio = crate::constants::DEFAULT_ZOOM_RATIO;
            }
            Reconfigure::FlashMode(mode) => {
                if !self.shared.options.has_flash && mode != FlashMode::Off {
                    return Err(SessionError::Unsupported("no flash unit".to_string()));
                }
                bound.flash_mode = mode;
            }
            Reconfigure::ZoomRatio(ratio) => {
                if ratio > self.shared.options.max_zoom_ratio {
                    return Err(SessionError::Unsupported(format!(
                        "zoom {} exceeds {}",
                        ratio, self.shared.options.max_zoom_ratio
                    )));
                }
                bound.zoom_ratio = ratio;
            }
        }
        debug!(?change, "Virtual camera reconfigured");
        Ok(())
    }

    async fn capture_still(&self, request: StillRequest) -> SessionResult<StillCapture> {
        let (lens, fps) = match self.shared.lock().bound.as_ref() {
            Some(bound) => (bound.lens, bound.target_fps),
            None => return not_ready(),
        };
        self.take_scripted(SessionOp::Capture)?;

        if !self.shared.options.capture_delay.is_zero() {
            tokio::time::sleep(self.shared.options.capture_delay).await;
        }

        // Unbound while we waited
        let last_frame = {
            let state = self.shared.lock();
            if state.bound.is_none() {
                return not_ready();
            }
            state.last_frame.clone()
        };

        debug!(
            format = ?request.image_format,
            flash = request.flash_mode.fires_on_capture(),
            fps,
            "Virtual still capture"
        );

        let frame = match last_frame {
            Some(frame) => frame,
            None => {
                let (width, height) = self.shared.options.frame_size;
                test_pattern(width, height, lens, self.shared.sequence.load(Ordering::SeqCst))
            }
        };
        Ok(StillCapture::Frame(frame))
    }

    async fn start_recording(&self, request: RecordingRequest) -> SessionResult<()> {
        if !self.is_bound() {
            return not_ready();
        }
        if self.is_recording() {
            return Err(SessionError::RecordingInProgress);
        }
        self.take_scripted(SessionOp::StartRecording)?;

        let writer = match &request.output {
            Some(path) => Some(Y4mWriter::create(path, request.target_fps)?),
            None => None,
        };

        let mut state = self.shared.lock();
        if state.recording.is_some() {
            return Err(SessionError::RecordingInProgress);
        }
        state.recording = Some(ActiveRecording {
            started_at: Instant::now(),
            output: request.output.clone(),
            writer,
            frames: 0,
        });
        info!(output = ?request.output, quality = ?request.video_quality, "Virtual recording started");
        Ok(())
    }

    async fn stop_recording(&self) -> SessionResult<RecordingOutput> {
        self.take_scripted(SessionOp::StopRecording)?;
        let recording = self
            .shared
            .lock()
            .recording
            .take()
            .ok_or(SessionError::NoRecordingInProgress)?;
        finish_recording(recording)
    }

    fn unbind(&self) {
        let frame_loop = self
            .shared
            .frame_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // Joined outside the state lock; the loop body takes it too
        drop(frame_loop);

        let (was_bound, recording) = {
            let mut state = self.shared.lock();
            let was_bound = state.bound.take().is_some();
            state.last_frame = None;
            (was_bound, state.recording.take())
        };
        if let Some(recording) = recording
            && let Err(e) = finish_recording(recording)
        {
            warn!(error = %e, "Failed to finalize virtual recording during unbind");
        }
        if was_bound {
            self.shared.unbind_count.fetch_add(1, Ordering::SeqCst);
            info!("Virtual camera unbound");
        }
    }
}

fn finish_recording(mut recording: ActiveRecording) -> SessionResult<RecordingOutput> {
    if let Some(writer) = recording.writer.as_mut() {
        writer.finish()?;
    }
    let duration_ms = recording.started_at.elapsed().as_millis() as u64;
    info!(
        duration_ms,
        frames = recording.frames,
        output = ?recording.output,
        "Virtual recording stopped"
    );
    Ok(RecordingOutput {
        duration_ms,
        output: recording.output,
    })
}

/// RGBA test pattern: lens-tinted gradient with a bar that moves per frame
pub fn test_pattern(width: u32, height: u32, lens: CameraLens, sequence: u64) -> CameraFrame {
    let tint: [u8; 3] = match lens {
        CameraLens::Back => [40, 90, 160],
        CameraLens::Front => [160, 90, 40],
    };
    let bar_width = (width / 16).max(1);
    let bar_x = ((sequence * 8) % width.max(1) as u64) as u32;

    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        let shade = (y * 255 / height.max(1)) as u8;
        for x in 0..width {
            if x >= bar_x && x < bar_x + bar_width {
                data.extend_from_slice(&[255, 255, 255, 255]);
            } else {
                data.extend_from_slice(&[
                    tint[0].saturating_add(shade / 2),
                    tint[1].saturating_add(shade / 3),
                    tint[2].saturating_add(shade / 4),
                    255,
                ]);
            }
        }
    }

    CameraFrame {
        width,
        height,
        data: Arc::from(data),
        format: PixelFormat::Rgba,
        stride: width * 4,
        sequence,
        captured_at: Instant::now(),
    }
}

/// Monochrome YUV4MPEG2 stream writer
struct Y4mWriter {
    out: BufWriter<File>,
    fps: u32,
    size: Option<(u32, u32)>,
}

impl Y4mWriter {
    fn create(path: &std::path::Path, fps: u32) -> SessionResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
            fps: fps.max(1),
            size: None,
        })
    }

    fn write_frame(&mut self, frame: &CameraFrame) -> std::io::Result<()> {
        match self.size {
            None => {
                writeln!(
                    self.out,
                    "YUV4MPEG2 W{} H{} F{}:1 Ip A1:1 Cmono",
                    frame.width, frame.height, self.fps
                )?;
                self.size = Some((frame.width, frame.height));
            }
            // Stream geometry is fixed by the first frame
            Some(size) if size != (frame.width, frame.height) => return Ok(()),
            Some(_) => {}
        }
        self.out.write_all(b"FRAME\n")?;
        self.out.write_all(frame.to_luma_image().as_raw())
    }

    fn finish(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageFormat;
    use crate::constants::VideoQuality;

    fn bind_request(lens: CameraLens) -> BindRequest {
        BindRequest {
            lens,
            flash_mode: FlashMode::Off,
            video_quality: VideoQuality::Sd,
            target_fps: 30,
            enable_hdr: false,
            device: None,
        }
    }

    #[tokio::test]
    async fn test_missing_lens_is_device_not_found() {
        let session = VirtualSession::new(VirtualSessionOptions {
            lenses: vec![CameraLens::Back],
            ..VirtualSessionOptions::manual()
        });
        let result = session
            .bind(bind_request(CameraLens::Front), SessionEvents::detached())
            .await;
        assert!(matches!(result, Err(SessionError::DeviceNotFound(_))));
        assert!(!session.is_bound());
    }

    #[tokio::test]
    async fn test_unbind_is_idempotent() {
        let session = VirtualSession::new(VirtualSessionOptions::manual());
        session
            .bind(bind_request(CameraLens::Back), SessionEvents::detached())
            .await
            .unwrap();
        session.unbind();
        session.unbind();
        assert_eq!(session.bind_count(), 1);
        assert_eq!(session.unbind_count(), 1);
    }

    #[tokio::test]
    async fn test_capture_without_frames_uses_pattern() {
        let session = VirtualSession::new(VirtualSessionOptions::manual());
        session
            .bind(bind_request(CameraLens::Back), SessionEvents::detached())
            .await
            .unwrap();
        let still = session
            .capture_still(StillRequest {
                image_format: ImageFormat::Png,
                flash_mode: FlashMode::Off,
                jpeg_quality: 90,
            })
            .await
            .unwrap();
        match still {
            StillCapture::Frame(frame) => assert_eq!((frame.width, frame.height), (64, 48)),
            StillCapture::Encoded { .. } => panic!("virtual session returns raw frames"),
        }
    }

    #[tokio::test]
    async fn test_recording_writes_y4m() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.y4m");
        let session = VirtualSession::new(VirtualSessionOptions::manual());
        session
            .bind(bind_request(CameraLens::Back), SessionEvents::detached())
            .await
            .unwrap();

        session
            .start_recording(RecordingRequest {
                output: Some(path.clone()),
                video_quality: VideoQuality::Sd,
                target_fps: 30,
                record_audio: false,
            })
            .await
            .unwrap();
        session.push_frame(test_pattern(64, 48, CameraLens::Back, 1));
        session.push_frame(test_pattern(64, 48, CameraLens::Back, 2));
        let output = session.stop_recording().await.unwrap();

        assert_eq!(output.output.as_deref(), Some(path.as_path()));
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"YUV4MPEG2 W64 H48 F30:1"));
        let header_len = bytes.iter().position(|&b| b == b'\n').unwrap() + 1;
        assert_eq!(bytes.len(), header_len + 2 * (6 + 64 * 48));
    }

    #[tokio::test]
    async fn test_scripted_failure_is_one_shot() {
        let session = VirtualSession::new(VirtualSessionOptions::manual());
        session.fail_next(SessionOp::Bind, SessionError::PermissionDenied);
        assert_eq!(
            session
                .bind(bind_request(CameraLens::Back), SessionEvents::detached())
                .await,
            Err(SessionError::PermissionDenied)
        );
        assert!(
            session
                .bind(bind_request(CameraLens::Back), SessionEvents::detached())
                .await
                .is_ok()
        );
    }
}
