// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the session-backed controller

use crosscam::backends::camera::virtual_session::test_pattern;
use crosscam::backends::camera::{CameraFrame, SessionOp, VirtualSession, VirtualSessionOptions};
use crosscam::{
    BarcodeScanner, CameraConfiguration, CameraController, CameraException, CameraLens,
    CameraPlugin, CameraState, CaptureOutput, ControllerBuilder, FlashMode, ImageCaptureResult,
    PhotoTarget, SessionController, SessionError, VideoRecordingResult, state_stream,
};
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

fn controller_with(
    options: VirtualSessionOptions,
) -> (SessionController<VirtualSession>, VirtualSession) {
    let session = VirtualSession::new(options);
    let controller = ControllerBuilder::new(session.clone())
        .photo_target(PhotoTarget::Memory)
        .video_output(None)
        .build();
    (controller, session)
}

fn controller() -> (SessionController<VirtualSession>, VirtualSession) {
    controller_with(VirtualSessionOptions::manual())
}

/// Plugin that only counts lifecycle calls
#[derive(Default)]
struct CountingPlugin {
    attaches: AtomicU64,
    detaches: AtomicU64,
}

impl CameraPlugin for CountingPlugin {
    fn id(&self) -> &str {
        "CountingPlugin"
    }

    fn on_attach(&self, _controller: &dyn CameraController) {
        self.attaches.fetch_add(1, Ordering::SeqCst);
    }

    fn on_detach(&self) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }
}

fn controller_with_plugins(
    plugins: &[Arc<dyn CameraPlugin>],
) -> (SessionController<VirtualSession>, VirtualSession) {
    let configuration = plugins
        .iter()
        .fold(CameraConfiguration::default(), |config, plugin| {
            config.with_plugin(plugin.clone())
        });
    let session = VirtualSession::new(VirtualSessionOptions::manual());
    let controller = ControllerBuilder::new(session.clone())
        .configuration(configuration)
        .photo_target(PhotoTarget::Memory)
        .video_output(None)
        .build();
    (controller, session)
}

fn frame(sequence: u64) -> CameraFrame {
    test_pattern(32, 24, CameraLens::Back, sequence)
}

#[tokio::test]
async fn test_state_stream_starts_initializing() {
    let (controller, _session) = controller();
    let mut states = Box::pin(state_stream(controller.subscribe_state()));

    let first = states.next().await.unwrap();
    assert!(first.is_initializing());

    controller.initialize().await.unwrap();
    let ready = states.next().await.unwrap();
    let ready = ready.ready().copied().unwrap();
    assert_eq!(ready.current_lens, CameraLens::Back);
    assert_eq!(ready.flash_mode, FlashMode::Off);
    assert!(!ready.is_recording);
    assert_eq!(ready.zoom_ratio, 1.0);
}

#[tokio::test]
async fn test_take_picture_in_memory() {
    let (controller, session) = controller();
    controller.initialize().await.unwrap();
    assert!(session.push_frame(frame(0)));

    match controller.take_picture().await {
        ImageCaptureResult::Success {
            width,
            height,
            output: CaptureOutput::Bytes(bytes),
        } => {
            assert_eq!((width, height), (32, 24));
            // JPEG SOI marker
            assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        }
        other => panic!("unexpected capture result: {:?}", other),
    }
}

#[tokio::test]
async fn test_take_picture_to_directory() {
    let dir = tempfile::tempdir().unwrap();
    let session = VirtualSession::new(VirtualSessionOptions::manual());
    let controller = ControllerBuilder::new(session)
        .photo_target(PhotoTarget::Directory(dir.path().join("photos")))
        .video_output(None)
        .build();
    controller.initialize().await.unwrap();

    let result = controller.take_picture().await;
    let path = result.path().expect("photo should be written to disk");
    assert!(path.starts_with(dir.path()));
    assert!(path.exists());
    assert_eq!(path.extension().unwrap(), "jpg");
}

#[tokio::test]
async fn test_operations_before_initialize_fail() {
    let (controller, _session) = controller();

    let capture = controller.take_picture().await;
    assert!(matches!(capture.error(), Some(CameraException::CaptureFailed(_))));
    assert!(controller.set_lens(CameraLens::Front).await.is_err());
    assert!(matches!(
        controller.start_recording().await,
        Err(CameraException::RecordingFailed(_))
    ));
    assert!(controller.state().is_initializing());
}

#[tokio::test]
async fn test_missing_lens_is_no_camera_available() {
    let (controller, _session) = controller_with(VirtualSessionOptions {
        lenses: vec![CameraLens::Front],
        ..VirtualSessionOptions::manual()
    });

    let err = controller.initialize().await.unwrap_err();
    assert!(matches!(err, CameraException::NoCameraAvailable));
    assert!(matches!(
        controller.state(),
        CameraState::Error(CameraException::NoCameraAvailable)
    ));
}

#[tokio::test]
async fn test_set_lens_and_flash_commit_after_success() {
    let (controller, session) = controller();
    controller.initialize().await.unwrap();

    controller.set_lens(CameraLens::Front).await.unwrap();
    controller.set_flash_mode(FlashMode::Torch).await.unwrap();
    let ready = controller.state().ready().copied().unwrap();
    assert_eq!(ready.current_lens, CameraLens::Front);
    assert_eq!(ready.flash_mode, FlashMode::Torch);
    assert_eq!(controller.configuration().lens(), CameraLens::Front);
    assert_eq!(session.current_lens(), Some(CameraLens::Front));
    assert_eq!(session.current_flash_mode(), Some(FlashMode::Torch));
}

#[tokio::test]
async fn test_failed_reconfigure_keeps_previous_values() {
    let (controller, session) = controller();
    controller.initialize().await.unwrap();

    session.fail_next(
        SessionOp::Reconfigure,
        SessionError::Other("lens switch refused".to_string()),
    );
    let err = controller.set_lens(CameraLens::Front).await.unwrap_err();
    assert!(matches!(err, CameraException::CaptureFailed(_)));

    let ready = controller.state().ready().copied().unwrap();
    assert_eq!(ready.current_lens, CameraLens::Back);
    assert_eq!(controller.configuration().lens(), CameraLens::Back);
}

#[tokio::test]
async fn test_concurrent_capture_is_rejected() {
    let (controller, _session) = controller_with(VirtualSessionOptions {
        capture_delay: Duration::from_millis(100),
        ..VirtualSessionOptions::manual()
    });
    controller.initialize().await.unwrap();

    let (first, second) = tokio::join!(controller.take_picture(), controller.take_picture());
    let failures = [&first, &second]
        .iter()
        .filter(|r| matches!(r.error(), Some(CameraException::CaptureFailed(_))))
        .count();
    assert_eq!(failures, 1);
    assert!(first.is_success() || second.is_success());

    // The slot is free again
    assert!(controller.take_picture().await.is_success());
}

#[tokio::test]
async fn test_capture_while_recording_without_simultaneous_support() {
    let (controller, _session) = controller();
    controller.initialize().await.unwrap();

    let recording = controller.start_recording().await.unwrap();
    assert!(controller.state().ready().unwrap().is_recording);

    let capture = controller.take_picture().await;
    assert!(matches!(capture.error(), Some(CameraException::CaptureFailed(_))));

    let result = recording.stop().await;
    assert!(result.is_success());
    assert!(!controller.state().ready().unwrap().is_recording);
}

#[tokio::test]
async fn test_capture_while_recording_with_simultaneous_support() {
    let (controller, _session) = controller_with(VirtualSessionOptions {
        simultaneous_still_and_video: true,
        ..VirtualSessionOptions::manual()
    });
    controller.initialize().await.unwrap();

    let recording = controller.start_recording().await.unwrap();
    assert!(controller.take_picture().await.is_success());
    assert!(recording.stop().await.is_success());
}

#[tokio::test]
async fn test_second_recording_is_rejected() {
    let (controller, _session) = controller();
    controller.initialize().await.unwrap();

    let recording = controller.start_recording().await.unwrap();
    assert!(matches!(
        controller.start_recording().await,
        Err(CameraException::RecordingFailed(_))
    ));
    // Lens is locked while recording
    assert!(controller.set_lens(CameraLens::Front).await.is_err());
    assert!(recording.stop().await.is_success());
}

#[tokio::test]
async fn test_recording_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let session = VirtualSession::new(VirtualSessionOptions::manual());
    let controller = ControllerBuilder::new(session.clone())
        .photo_target(PhotoTarget::Memory)
        .video_output(Some(dir.path().to_path_buf()))
        .build();
    controller.initialize().await.unwrap();

    let recording = controller.start_recording().await.unwrap();
    for sequence in 0..3 {
        session.push_frame(frame(sequence));
    }
    match recording.stop().await {
        VideoRecordingResult::Success {
            output: Some(path), ..
        } => {
            assert!(path.starts_with(dir.path()));
            assert!(std::fs::metadata(&path).unwrap().len() > 0);
        }
        other => panic!("unexpected recording result: {:?}", other),
    }
}

#[tokio::test]
async fn test_dropped_recording_is_finalized() {
    let (controller, session) = controller();
    controller.initialize().await.unwrap();

    let recording = controller.start_recording().await.unwrap();
    assert!(session.is_recording());
    drop(recording);

    for _ in 0..50 {
        if !session.is_recording() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!session.is_recording());
    assert!(!controller.state().ready().unwrap().is_recording);
}

#[tokio::test]
async fn test_stop_after_release_is_cancelled() {
    let (controller, _session) = controller();
    controller.initialize().await.unwrap();

    let recording = controller.start_recording().await.unwrap();
    controller.release();

    let result = recording.stop().await;
    assert!(matches!(
        result.error(),
        Some(CameraException::RecordingFailed(_))
    ));
}

#[tokio::test]
async fn test_frames_reach_listeners_only_while_ready() {
    let (controller, session) = controller();
    let seen = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&seen);
    controller.add_frame_listener(Arc::new(move |_: &CameraFrame| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    // Not bound yet
    assert!(!session.push_frame(frame(0)));

    controller.initialize().await.unwrap();
    session.push_frame(frame(1));
    session.push_frame(frame(2));
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    controller.release();
    session.push_frame(frame(3));
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert!(controller.frame_listeners().is_empty());
}

#[tokio::test]
async fn test_runtime_failure_moves_to_error() {
    let (controller, session) = controller();
    controller.initialize().await.unwrap();

    session.fail(SessionError::Disconnected("unplugged".to_string()));
    assert!(controller.state().is_error());

    // First error sticks
    session.fail(SessionError::Other("later".to_string()));
    let err = controller.initialize().await.unwrap_err();
    assert_eq!(err.to_string(), controller.state().error().unwrap().to_string());
    assert!(!controller.take_picture().await.is_success());
}

#[tokio::test]
async fn test_release_cancels_pending_capture() {
    let (controller, _session) = controller_with(VirtualSessionOptions {
        capture_delay: Duration::from_secs(5),
        ..VirtualSessionOptions::manual()
    });
    let controller = Arc::new(controller);
    controller.initialize().await.unwrap();

    let pending = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.take_picture().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.release();

    let result = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("capture should resolve promptly after release")
        .unwrap();
    assert!(matches!(result.error(), Some(CameraException::CaptureFailed(_))));
}

#[tokio::test]
async fn test_drop_releases_session() {
    let (controller, session) = controller();
    controller.initialize().await.unwrap();
    assert!(session.is_bound());

    drop(controller);
    assert!(!session.is_bound());
    assert_eq!(session.unbind_count(), 1);
}

#[tokio::test]
async fn test_release_without_initialize() {
    let counting = Arc::new(CountingPlugin::default());
    let scanner = Arc::new(BarcodeScanner::new());
    let plugins: [Arc<dyn CameraPlugin>; 2] = [counting.clone(), scanner.clone()];
    let (controller, session) = controller_with_plugins(&plugins);

    controller.release();
    assert!(controller.frame_listeners().is_empty());
    assert_eq!(counting.attaches.load(Ordering::SeqCst), 0);
    assert_eq!(counting.detaches.load(Ordering::SeqCst), 0);
    assert!(!scanner.is_attached());
    assert!(!session.is_bound());
}

#[tokio::test]
async fn test_release_twice_detaches_plugins_once() {
    let counting = Arc::new(CountingPlugin::default());
    let scanner = Arc::new(BarcodeScanner::new());
    let plugins: [Arc<dyn CameraPlugin>; 2] = [counting.clone(), scanner.clone()];
    let (controller, _session) = controller_with_plugins(&plugins);
    controller.initialize().await.unwrap();
    assert_eq!(counting.attaches.load(Ordering::SeqCst), 1);
    assert_eq!(controller.frame_listeners().len(), 1);

    controller.release();
    controller.release();
    assert_eq!(counting.detaches.load(Ordering::SeqCst), 1);
    assert!(controller.frame_listeners().is_empty());
    assert!(!scanner.is_attached());
}
