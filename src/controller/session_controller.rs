// SPDX-License-Identifier: GPL-3.0-only

//! [`CameraController`] over one [`NativeSession`]
//!
//! Operations that change the session (initialize, reconfiguration,
//! recording start and stop) are serialized on an async lock. Still capture
//! runs beside them but at most one at a time. `release()` flips a shutdown
//! flag every in-flight operation selects against, so nothing started
//! before a release completes after it.

use super::recording::{RecordingControl, VideoRecording};
use super::{CameraController, FrameListener, FrameListenerRegistry};
use crate::backends::camera::{
    BindRequest, CameraFrame, NativeSession, Reconfigure, RecordingRequest, SessionCapabilities,
    SessionEvents, SessionObserver, StillRequest,
};
use crate::config::{CameraConfiguration, CameraLens, Settings};
use crate::constants::DEFAULT_ZOOM_RATIO;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::{CameraException, SessionError, SessionResult};
use crate::flash::FlashMode;
use crate::permissions::{CameraPermission, PermissionManager, PermissionStatus};
use crate::pipelines::photo::{self, CaptureOutput, PhotoEncoder, PhotoTarget};
use crate::pipelines::video::recording_filename;
use crate::pipelines::{ImageCaptureResult, VideoRecordingResult};
use crate::plugins::CameraPlugin;
use crate::state::{CameraState, ReadyState, StatePublisher};
use async_trait::async_trait;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Builder for [`SessionController`]
pub struct ControllerBuilder<S> {
    session: S,
    configuration: CameraConfiguration,
    settings: Settings,
    permissions: Option<PermissionManager>,
    photo_target: Option<PhotoTarget>,
    video_output: Option<Option<PathBuf>>,
}

impl<S: NativeSession> ControllerBuilder<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            configuration: CameraConfiguration::default(),
            settings: Settings::default(),
            permissions: None,
            photo_target: None,
            video_output: None,
        }
    }

    pub fn configuration(mut self, configuration: CameraConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Gate `initialize()` on the camera permission
    pub fn permissions(mut self, permissions: PermissionManager) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Where photos go; defaults to the settings' photo directory
    pub fn photo_target(mut self, target: PhotoTarget) -> Self {
        self.photo_target = Some(target);
        self
    }

    /// Folder for recordings; `None` records without persisting.
    /// Defaults to the settings' video directory.
    pub fn video_output(mut self, directory: Option<PathBuf>) -> Self {
        self.video_output = Some(directory);
        self
    }

    pub fn build(self) -> SessionController<S> {
        let photo_target = self
            .photo_target
            .unwrap_or_else(|| PhotoTarget::Directory(self.settings.photo_dir()));
        let video_dir = self
            .video_output
            .unwrap_or_else(|| Some(self.settings.video_dir()));
        let (shutdown, _) = watch::channel(false);

        SessionController {
            inner: Arc::new(Inner {
                session: self.session,
                core: Arc::new(Core {
                    state: StatePublisher::new(),
                    listeners: Arc::new(FrameListenerRegistry::new()),
                    delivering: AtomicBool::new(false),
                    released: AtomicBool::new(false),
                    frames: AtomicU64::new(0),
                }),
                configuration: Mutex::new(self.configuration),
                settings: self.settings,
                permissions: self.permissions,
                photo_target,
                video_dir,
                op_lock: tokio::sync::Mutex::new(()),
                capture_in_flight: AtomicBool::new(false),
                recording: Mutex::new(None),
                attached: Mutex::new(Vec::new()),
                shutdown,
            }),
        }
    }
}

/// Controller driving a native session of type `S`
///
/// Dropping the controller releases it.
pub struct SessionController<S: NativeSession> {
    inner: Arc<Inner<S>>,
}

/// The part the session calls back into
struct Core {
    state: StatePublisher,
    listeners: Arc<FrameListenerRegistry>,
    /// Frames reach listeners only while Ready
    delivering: AtomicBool,
    released: AtomicBool,
    frames: AtomicU64,
}

enum RecordingSlot {
    /// `start_recording` is talking to the session
    Starting,
    Active { id: Uuid, output: Option<PathBuf> },
}

struct Inner<S> {
    session: S,
    core: Arc<Core>,
    /// Configuration as last applied to the session
    configuration: Mutex<CameraConfiguration>,
    settings: Settings,
    permissions: Option<PermissionManager>,
    photo_target: PhotoTarget,
    video_dir: Option<PathBuf>,
    op_lock: tokio::sync::Mutex<()>,
    capture_in_flight: AtomicBool,
    recording: Mutex<Option<RecordingSlot>>,
    attached: Mutex<Vec<Arc<dyn CameraPlugin>>>,
    shutdown: watch::Sender<bool>,
}

/// Clears the capture flag however the capture ends
struct CaptureGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl SessionObserver for Core {
    fn on_frame(&self, frame: &CameraFrame) {
        if !self.delivering.load(Ordering::Acquire) {
            return;
        }
        let frames = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if frames % FRAME_LOG_INTERVAL == 0 {
            trace!(
                frames,
                sequence = frame.sequence,
                listeners = self.listeners.len(),
                "Dispatching frames"
            );
        }
        self.listeners.dispatch(frame);
    }

    fn on_error(&self, error: SessionError) {
        if self.released.load(Ordering::Acquire) {
            debug!(error = %error, "Ignoring session error after release");
            return;
        }
        self.delivering.store(false, Ordering::Release);
        let exception = CameraException::from_runtime_failure(error);
        if self.state.fail(exception.clone()) {
            error!(error = %exception, "Camera session failed");
        }
    }
}

impl Core {
    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

/// Resolves once `release()` has been called
async fn released(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

impl<S: NativeSession> Inner<S> {
    fn configuration_lock(&self) -> MutexGuard<'_, CameraConfiguration> {
        self.configuration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn recording_lock(&self) -> MutexGuard<'_, Option<RecordingSlot>> {
        self.recording.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attached_lock(&self) -> MutexGuard<'_, Vec<Arc<dyn CameraPlugin>>> {
        self.attached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn capabilities(&self) -> SessionCapabilities {
        self.session.capabilities()
    }

    /// Run `operation` unless `release()` happens first
    async fn guarded<T>(
        &self,
        operation: impl Future<Output = SessionResult<T>> + Send,
    ) -> SessionResult<T> {
        let shutdown = self.shutdown.subscribe();
        let result = tokio::select! {
            result = operation => result,
            () = released(shutdown) => Err(SessionError::Cancelled),
        };
        // A completion racing with release is discarded
        if self.core.is_released() {
            return Err(SessionError::Cancelled);
        }
        result
    }

    fn ensure_ready(&self) -> SessionResult<ReadyState> {
        if self.core.is_released() {
            return Err(SessionError::Cancelled);
        }
        match self.core.state.current() {
            CameraState::Ready(ready) => Ok(ready),
            _ => Err(SessionError::NotReady),
        }
    }

    /// Publish `exception` unless an earlier failure already stuck
    fn fail(&self, exception: CameraException) -> CameraException {
        self.core.delivering.store(false, Ordering::Release);
        self.core.state.fail(exception.clone());
        self.core.state.current().error().cloned().unwrap_or(exception)
    }

    async fn bind(&self) -> Result<ReadyState, CameraException> {
        let _op = self.op_lock.lock().await;
        if self.core.is_released() {
            return Err(CameraException::initialization_failed(SessionError::Cancelled));
        }
        match self.core.state.current() {
            CameraState::Ready(ready) => {
                debug!("Camera already initialized");
                return Ok(ready);
            }
            CameraState::Error(exception) => return Err(exception),
            CameraState::Initializing => {}
        }

        if let Some(permissions) = &self.permissions {
            let status = permissions.check_permission(CameraPermission::Camera);
            if status != PermissionStatus::Granted {
                warn!(?status, "Camera permission not granted");
                return Err(self.fail(CameraException::PermissionDenied));
            }
        }

        let configuration = self.configuration_lock().clone();
        let lens = configuration.lens();
        let request = BindRequest {
            lens,
            flash_mode: configuration.flash_mode(),
            video_quality: configuration.video_quality(),
            target_fps: configuration.target_fps(),
            enable_hdr: configuration.enable_hdr(),
            device: self.settings.device_for(lens).map(str::to_string),
        };
        info!(
            backend = self.session.name(),
            ?lens,
            fps = request.target_fps,
            quality = ?request.video_quality,
            "Initializing camera"
        );

        let observer: Arc<dyn SessionObserver> = self.core.clone();
        let events = SessionEvents::new(Arc::downgrade(&observer));
        match self.guarded(self.session.bind(request, events)).await {
            Ok(()) => {}
            Err(SessionError::Cancelled) => {
                self.session.unbind();
                return Err(CameraException::initialization_failed(SessionError::Cancelled));
            }
            Err(e) => {
                let exception = CameraException::from_bind_failure(e);
                error!(error = %exception, "Camera initialization failed");
                return Err(self.fail(exception));
            }
        }

        let ready = ReadyState {
            current_lens: lens,
            flash_mode: configuration.flash_mode(),
            is_recording: false,
            zoom_ratio: DEFAULT_ZOOM_RATIO,
        };
        if !self.core.state.enter_ready(ready) {
            // The session reported a failure while binding
            let exception = self
                .core
                .state
                .current()
                .error()
                .cloned()
                .unwrap_or_else(|| CameraException::unknown("Camera left Initializing early"));
            return Err(exception);
        }
        Ok(ready)
    }

    async fn reconfigure(&self, change: Reconfigure) -> SessionResult<()> {
        self.guarded(self.session.reconfigure(change)).await
    }

    async fn set_lens(&self, lens: CameraLens) -> Result<(), CameraException> {
        let _op = self.op_lock.lock().await;
        let ready = self.ensure_ready().map_err(CameraException::capture_failed)?;
        if ready.current_lens == lens {
            return Ok(());
        }
        if self.recording_lock().is_some() {
            return Err(CameraException::capture_failed(
                SessionError::RecordingInProgress,
            ));
        }

        if let Err(e) = self.reconfigure(Reconfigure::Lens(lens)).await {
            warn!(?lens, error = %e, "Lens switch failed");
            return Err(CameraException::capture_failed(e));
        }
        {
            let mut configuration = self.configuration_lock();
            *configuration = configuration.with_lens(lens);
        }
        self.core.state.update_ready(|ready| {
            ready.current_lens = lens;
            ready.zoom_ratio = DEFAULT_ZOOM_RATIO;
        });
        info!(?lens, "Switched lens");
        Ok(())
    }

    async fn set_flash_mode(&self, mode: FlashMode) -> Result<(), CameraException> {
        let _op = self.op_lock.lock().await;
        let ready = self.ensure_ready().map_err(CameraException::capture_failed)?;
        if ready.flash_mode == mode {
            return Ok(());
        }

        if let Err(e) = self.reconfigure(Reconfigure::FlashMode(mode)).await {
            warn!(?mode, error = %e, "Flash mode change failed");
            return Err(CameraException::capture_failed(e));
        }
        {
            let mut configuration = self.configuration_lock();
            *configuration = configuration.with_flash_mode(mode);
        }
        self.core.state.update_ready(|ready| ready.flash_mode = mode);
        info!(?mode, "Flash mode changed");
        Ok(())
    }

    async fn set_zoom_ratio(&self, ratio: f32) -> Result<(), CameraException> {
        if ratio.is_nan() || ratio < 0.0 {
            return Err(CameraException::capture_failed(SessionError::Other(
                format!("invalid zoom ratio {}", ratio),
            )));
        }
        let max = self.capabilities().max_zoom_ratio.max(DEFAULT_ZOOM_RATIO);
        let ratio = ratio.clamp(DEFAULT_ZOOM_RATIO, max);

        let _op = self.op_lock.lock().await;
        let ready = self.ensure_ready().map_err(CameraException::capture_failed)?;
        if ready.zoom_ratio == ratio {
            return Ok(());
        }

        if let Err(e) = self.reconfigure(Reconfigure::ZoomRatio(ratio)).await {
            warn!(ratio, error = %e, "Zoom change failed");
            return Err(CameraException::capture_failed(e));
        }
        self.core.state.update_ready(|ready| ready.zoom_ratio = ratio);
        debug!(ratio, "Zoom changed");
        Ok(())
    }

    /// Claim the single capture slot
    fn begin_capture(&self) -> Result<CaptureGuard<'_>, CameraException> {
        let recording = self.recording_lock();
        if self.capture_in_flight.load(Ordering::Acquire) {
            return Err(CameraException::capture_failed(SessionError::Busy(
                "another capture is in progress".to_string(),
            )));
        }
        if recording.is_some() && !self.capabilities().simultaneous_still_and_video {
            return Err(CameraException::capture_failed(SessionError::Unsupported(
                "still capture while recording".to_string(),
            )));
        }
        self.capture_in_flight.store(true, Ordering::Release);
        Ok(CaptureGuard {
            flag: &self.capture_in_flight,
        })
    }

    async fn take_picture(&self) -> Result<(u32, u32, CaptureOutput), CameraException> {
        let ready = self.ensure_ready().map_err(CameraException::capture_failed)?;
        let _capture = self.begin_capture()?;

        let format = self.configuration_lock().image_format();
        let request = StillRequest {
            image_format: format,
            flash_mode: ready.flash_mode,
            jpeg_quality: self.settings.jpeg_quality,
        };
        let encoder = PhotoEncoder::new(format, self.settings.jpeg_quality);
        debug!(?format, flash = ?ready.flash_mode, "Capturing photo");

        let start = Instant::now();
        let result = self
            .guarded(async {
                let still = self.session.capture_still(request).await?;
                let encoded = encoder.finish(still).await?;
                let (width, height) = (encoded.width, encoded.height);
                let output = photo::store(encoded, &self.photo_target).await?;
                Ok::<_, SessionError>((width, height, output))
            })
            .await;

        match result {
            Ok((width, height, output)) => {
                info!(
                    width,
                    height,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Photo captured"
                );
                Ok((width, height, output))
            }
            Err(e) => {
                warn!(error = %e, "Photo capture failed");
                Err(CameraException::capture_failed(e))
            }
        }
    }

    async fn start_recording(&self) -> Result<Uuid, CameraException> {
        let _op = self.op_lock.lock().await;
        self.ensure_ready()
            .map_err(CameraException::recording_failed)?;
        let capabilities = self.capabilities();
        {
            let mut slot = self.recording_lock();
            if slot.is_some() {
                return Err(CameraException::recording_failed(
                    SessionError::RecordingInProgress,
                ));
            }
            if self.capture_in_flight.load(Ordering::Acquire)
                && !capabilities.simultaneous_still_and_video
            {
                return Err(CameraException::recording_failed(SessionError::Busy(
                    "a still capture is in progress".to_string(),
                )));
            }
            *slot = Some(RecordingSlot::Starting);
        }

        match self.open_recording(&capabilities).await {
            Ok(output) => {
                let id = Uuid::new_v4();
                *self.recording_lock() = Some(RecordingSlot::Active {
                    id,
                    output: output.clone(),
                });
                self.core.state.update_ready(|ready| ready.is_recording = true);
                info!(%id, ?output, "Recording started");
                Ok(id)
            }
            Err(e) => {
                *self.recording_lock() = None;
                warn!(error = %e, "Failed to start recording");
                Err(CameraException::recording_failed(e))
            }
        }
    }

    async fn open_recording(
        &self,
        capabilities: &SessionCapabilities,
    ) -> SessionResult<Option<PathBuf>> {
        let output = match &self.video_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                Some(dir.join(recording_filename(capabilities.video_container)))
            }
            None => None,
        };
        let configuration = self.configuration_lock().clone();
        let request = RecordingRequest {
            output: output.clone(),
            video_quality: configuration.video_quality(),
            target_fps: configuration.target_fps(),
            record_audio: self.settings.record_audio,
        };
        self.guarded(self.session.start_recording(request)).await?;
        Ok(output)
    }

    fn release(&self) {
        if self.core.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.core.delivering.store(false, Ordering::Release);
        self.shutdown.send_replace(true);

        let plugins = std::mem::take(&mut *self.attached_lock());
        for plugin in &plugins {
            if catch_unwind(AssertUnwindSafe(|| plugin.on_detach())).is_err() {
                warn!(plugin = plugin.id(), "Plugin panicked while detaching");
            }
        }
        self.core.listeners.clear();

        let had_recording = self.recording_lock().take().is_some();
        if catch_unwind(AssertUnwindSafe(|| self.session.unbind())).is_err() {
            warn!(backend = self.session.name(), "Native session panicked during unbind");
        }
        self.core.state.update_ready(|ready| ready.is_recording = false);

        info!(
            backend = self.session.name(),
            plugins = plugins.len(),
            had_recording,
            "Camera released"
        );
    }
}

#[async_trait]
impl<S: NativeSession> RecordingControl for Inner<S> {
    async fn stop_recording(&self, id: Uuid) -> VideoRecordingResult {
        let _op = self.op_lock.lock().await;
        let active = matches!(
            &*self.recording_lock(),
            Some(RecordingSlot::Active { id: current, .. }) if *current == id
        );
        if !active {
            let cause = if self.core.is_released() {
                SessionError::Cancelled
            } else {
                SessionError::NoRecordingInProgress
            };
            return VideoRecordingResult::Error(CameraException::recording_failed(cause));
        }

        let result = self.guarded(self.session.stop_recording()).await;
        if !self.core.is_released() {
            *self.recording_lock() = None;
            self.core.state.update_ready(|ready| ready.is_recording = false);
        }

        match result {
            Ok(output) => {
                info!(
                    %id,
                    duration_ms = output.duration_ms,
                    output = ?output.output,
                    "Recording stopped"
                );
                VideoRecordingResult::Success {
                    duration_ms: output.duration_ms,
                    output: output.output,
                }
            }
            Err(e) => {
                warn!(%id, error = %e, "Failed to stop recording");
                VideoRecordingResult::Error(CameraException::recording_failed(e))
            }
        }
    }
}

impl<S: NativeSession> SessionController<S> {
    /// The native session this controller drives
    pub fn session(&self) -> &S {
        &self.inner.session
    }

    pub fn capabilities(&self) -> SessionCapabilities {
        self.inner.capabilities()
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn is_released(&self) -> bool {
        self.inner.core.is_released()
    }

    fn attach_plugins(&self, configuration: &CameraConfiguration) {
        let mut attached = self.inner.attached_lock();
        for plugin in configuration.plugins() {
            if attached.iter().any(|p| p.id() == plugin.id()) {
                continue;
            }
            plugin.on_attach(self);
            debug!(plugin = plugin.id(), "Attached plugin");
            attached.push(Arc::clone(plugin));
        }
    }
}

#[async_trait]
impl<S: NativeSession> CameraController for SessionController<S> {
    async fn initialize(&self) -> Result<(), CameraException> {
        let was_ready = self.inner.core.state.current().is_ready();
        self.inner.bind().await?;
        if was_ready {
            return Ok(());
        }

        let configuration = self.inner.configuration_lock().clone();
        self.attach_plugins(&configuration);
        if self.inner.core.is_released() {
            // Released while attaching; release() only saw what was attached before
            for plugin in std::mem::take(&mut *self.inner.attached_lock()) {
                plugin.on_detach();
            }
            return Err(CameraException::initialization_failed(SessionError::Cancelled));
        }
        self.inner.core.delivering.store(true, Ordering::Release);
        info!(
            backend = self.inner.session.name(),
            plugins = configuration.plugins().len(),
            "Camera ready"
        );
        Ok(())
    }

    fn release(&self) {
        self.inner.release();
    }

    fn state(&self) -> CameraState {
        self.inner.core.state.current()
    }

    fn subscribe_state(&self) -> watch::Receiver<CameraState> {
        self.inner.core.state.subscribe()
    }

    fn configuration(&self) -> CameraConfiguration {
        self.inner.configuration_lock().clone()
    }

    async fn set_lens(&self, lens: CameraLens) -> Result<(), CameraException> {
        self.inner.set_lens(lens).await
    }

    async fn set_flash_mode(&self, mode: FlashMode) -> Result<(), CameraException> {
        self.inner.set_flash_mode(mode).await
    }

    async fn set_zoom_ratio(&self, ratio: f32) -> Result<(), CameraException> {
        self.inner.set_zoom_ratio(ratio).await
    }

    async fn take_picture(&self) -> ImageCaptureResult {
        match self.inner.take_picture().await {
            Ok((width, height, output)) => ImageCaptureResult::Success {
                width,
                height,
                output,
            },
            Err(exception) => ImageCaptureResult::Error(exception),
        }
    }

    async fn start_recording(&self) -> Result<VideoRecording, CameraException> {
        let id = self.inner.start_recording().await?;
        let control: Arc<dyn RecordingControl> = self.inner.clone();
        let control: Weak<dyn RecordingControl> = Arc::downgrade(&control);
        Ok(VideoRecording::new(id, Instant::now(), control))
    }

    fn add_frame_listener(&self, listener: Arc<dyn FrameListener>) {
        if !self.inner.core.listeners.add(listener) {
            debug!("Frame listener already registered");
        }
    }

    fn remove_frame_listener(&self, listener: &Arc<dyn FrameListener>) {
        self.inner.core.listeners.remove(listener);
    }

    fn frame_listeners(&self) -> Arc<FrameListenerRegistry> {
        Arc::clone(&self.inner.core.listeners)
    }
}

impl<S: NativeSession> Drop for SessionController<S> {
    fn drop(&mut self) {
        self.inner.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{SessionOp, VirtualSession, VirtualSessionOptions};

    fn controller() -> (SessionController<VirtualSession>, VirtualSession) {
        let session = VirtualSession::new(VirtualSessionOptions::manual());
        let controller = ControllerBuilder::new(session.clone())
            .photo_target(PhotoTarget::Memory)
            .video_output(None)
            .build();
        (controller, session)
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (controller, session) = controller();
        controller.initialize().await.unwrap();
        controller.initialize().await.unwrap();
        assert!(controller.state().is_ready());
        assert_eq!(session.bind_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_initialize_is_sticky() {
        let (controller, session) = controller();
        session.fail_next(SessionOp::Bind, SessionError::Other("no luck".into()));

        let first = controller.initialize().await.unwrap_err();
        assert!(matches!(first, CameraException::InitializationFailed(_)));

        let second = controller.initialize().await.unwrap_err();
        assert!(matches!(second, CameraException::InitializationFailed(_)));
        assert_eq!(session.bind_count(), 0);
        assert!(controller.state().is_error());
    }

    #[tokio::test]
    async fn test_zoom_rejects_nan_and_clamps() {
        let (controller, session) = controller();
        controller.initialize().await.unwrap();

        assert!(controller.set_zoom_ratio(f32::NAN).await.is_err());
        assert!(controller.set_zoom_ratio(-1.0).await.is_err());

        controller.set_zoom_ratio(100.0).await.unwrap();
        assert_eq!(controller.state().ready().unwrap().zoom_ratio, 8.0);
        assert_eq!(session.current_zoom_ratio(), Some(8.0));

        controller.set_zoom_ratio(0.5).await.unwrap();
        assert_eq!(controller.state().ready().unwrap().zoom_ratio, 1.0);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (controller, session) = controller();
        controller.initialize().await.unwrap();
        controller.release();
        controller.release();
        assert!(controller.is_released());
        assert_eq!(session.unbind_count(), 1);
        assert!(controller.set_lens(CameraLens::Front).await.is_err());
    }
}
