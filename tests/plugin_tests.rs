// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for frame-analysis plugins

use crosscam::backends::camera::virtual_session::test_pattern;
use crosscam::backends::camera::{CameraFrame, VirtualSession, VirtualSessionOptions};
use crosscam::plugins::{
    Barcode, BarcodeFormat, BarcodeValue, DetectorError, RecognitionLevel, TextResult,
};
use crosscam::{
    BarcodeScanner, CameraConfiguration, CameraController, CameraLens, CameraPlugin,
    ControllerBuilder, PhotoTarget, SessionController, TextRecognizer,
};
use std::sync::Arc;
use image::GrayImage;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn controller(
    configuration: CameraConfiguration,
) -> (SessionController<VirtualSession>, VirtualSession) {
    let session = VirtualSession::new(VirtualSessionOptions::manual());
    let controller = ControllerBuilder::new(session.clone())
        .configuration(configuration)
        .photo_target(PhotoTarget::Memory)
        .video_output(None)
        .build();
    (controller, session)
}

fn frame() -> CameraFrame {
    test_pattern(16, 16, CameraLens::Back, 0)
}

/// Render `payload` as a QR code, `scale` pixels per module with a quiet zone
fn qr_frame(payload: &str, scale: u32) -> CameraFrame {
    let code = qrcode::QrCode::new(payload.as_bytes()).unwrap();
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let quiet = 4;
    let size = (modules + 2 * quiet) * scale;
    let image = GrayImage::from_fn(size, size, |x, y| {
        let (mx, my) = (x / scale, y / scale);
        let dark = mx >= quiet
            && my >= quiet
            && mx < modules + quiet
            && my < modules + quiet
            && colors[((my - quiet) * modules + (mx - quiet)) as usize] == qrcode::Color::Dark;
        image::Luma([if dark { 0 } else { 255 }])
    });
    CameraFrame::from_luma(&image)
}

/// Poll `condition` until it holds or the wait expires
async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Keep feeding frames until `condition` holds; frames arriving while the
/// detector is busy are dropped, so one push is not always enough
async fn push_until(session: &VirtualSession, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        session.push_frame(frame());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scanner_publishes_detected_barcode() {
    let scanner = Arc::new(BarcodeScanner::with_detector(Arc::new(
        |_: &CameraFrame| -> Result<Vec<Barcode>, DetectorError> {
            Ok(vec![Barcode::new("ABC123", BarcodeFormat::Code128)])
        },
    )));
    let (controller, session) =
        controller(CameraConfiguration::default().with_plugin(scanner.clone()));
    let mut barcodes = scanner.barcodes();
    assert!(barcodes.get().is_empty());

    controller.initialize().await.unwrap();
    assert!(scanner.is_attached());
    session.push_frame(frame());

    let update = tokio::time::timeout(WAIT, barcodes.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.len(), 1);
    assert_eq!(update[0].raw_value, "ABC123");
    assert_eq!(update[0].value(), BarcodeValue::Text("ABC123".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_default_scanner_decodes_qr_frame() {
    let scanner = Arc::new(BarcodeScanner::new());
    let (controller, session) =
        controller(CameraConfiguration::default().with_plugin(scanner.clone()));
    let mut barcodes = scanner.barcodes();
    controller.initialize().await.unwrap();

    session.push_frame(qr_frame("ABC123", 4));
    let update = tokio::time::timeout(WAIT, barcodes.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.len(), 1);
    assert_eq!(update[0].raw_value, "ABC123");
    assert_eq!(update[0].format, BarcodeFormat::QrCode);
    assert!(update[0].bounds.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_default_scanner_downscales_large_frames() {
    let scanner = Arc::new(BarcodeScanner::new());
    let (controller, session) =
        controller(CameraConfiguration::default().with_plugin(scanner.clone()));
    controller.initialize().await.unwrap();

    // 29 modules at 30px is well past the detection size limit
    let frame = qr_frame("ABC123", 30);
    assert!(frame.width > 640);
    session.push_frame(frame);
    assert!(wait_until(|| !scanner.current().is_empty()).await);
    assert_eq!(scanner.current()[0].raw_value, "ABC123");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_value_is_retained_after_detach() {
    let scanner = Arc::new(BarcodeScanner::with_detector(Arc::new(
        |_: &CameraFrame| -> Result<Vec<Barcode>, DetectorError> {
            Ok(vec![Barcode::new("https://example.org", BarcodeFormat::QrCode)])
        },
    )));
    let (controller, session) =
        controller(CameraConfiguration::default().with_plugin(scanner.clone()));
    controller.initialize().await.unwrap();
    session.push_frame(frame());
    assert!(wait_until(|| !scanner.current().is_empty()).await);

    controller.release();
    assert!(!scanner.is_attached());
    assert_eq!(scanner.current()[0].raw_value, "https://example.org");
    assert_eq!(
        scanner.current()[0].value(),
        BarcodeValue::Url("https://example.org".to_string())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_busy_detector_drops_frames() {
    let gate = Arc::new(AtomicBool::new(false));
    let calls = Arc::new(AtomicU64::new(0));
    let detector = {
        let gate = Arc::clone(&gate);
        let calls = Arc::clone(&calls);
        move |frame: &CameraFrame| -> Result<Vec<Barcode>, DetectorError> {
            calls.fetch_add(1, Ordering::SeqCst);
            while !gate.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
            Ok(vec![Barcode::new(
                frame.sequence.to_string(),
                BarcodeFormat::QrCode,
            )])
        }
    };
    let scanner = Arc::new(BarcodeScanner::with_detector(Arc::new(detector)));
    let (controller, session) =
        controller(CameraConfiguration::default().with_plugin(scanner.clone()));
    controller.initialize().await.unwrap();

    // The first frame occupies the detector, the rest are dropped
    for _ in 0..4 {
        session.push_frame(frame());
    }
    assert_eq!(scanner.frames_dropped(), 3);

    gate.store(true, Ordering::SeqCst);
    assert!(wait_until(|| scanner.frames_analyzed() == 1).await);
    assert!(wait_until(|| !scanner.current().is_empty()).await);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(scanner.current()[0].raw_value, "1");

    // Free again: later frames are analyzed
    assert!(push_until(&session, || scanner.frames_analyzed() >= 2).await);
    assert!(wait_until(|| scanner.current()[0].raw_value != "1").await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_detector_errors_and_panics_are_contained() {
    let calls = Arc::new(AtomicU64::new(0));
    let detector = {
        let calls = Arc::clone(&calls);
        move |_: &CameraFrame| -> Result<Vec<Barcode>, DetectorError> {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => panic!("detector bug"),
                1 => Err(DetectorError::Failed("blurry".to_string())),
                _ => Ok(vec![Barcode::new("ok", BarcodeFormat::QrCode)]),
            }
        }
    };
    let scanner = Arc::new(BarcodeScanner::with_detector(Arc::new(detector)));
    let (controller, session) =
        controller(CameraConfiguration::default().with_plugin(scanner.clone()));
    controller.initialize().await.unwrap();

    session.push_frame(frame());
    assert!(wait_until(|| scanner.frames_analyzed() == 1).await);
    assert!(scanner.current().is_empty());

    // Neither the panic nor the error stops later detections
    assert!(push_until(&session, || !scanner.current().is_empty()).await);
    assert!(calls.load(Ordering::SeqCst) >= 3);
    assert!(controller.state().is_ready());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_format_filter() {
    let detector = |_: &CameraFrame| -> Result<Vec<Barcode>, DetectorError> {
        Ok(vec![
            Barcode::new("4006381333931", BarcodeFormat::Ean13),
            Barcode::new("hello", BarcodeFormat::QrCode),
        ])
    };
    let scanner = Arc::new(BarcodeScanner::with_detector_and_formats(
        Arc::new(detector),
        [BarcodeFormat::QrCode],
    ));
    let (controller, session) =
        controller(CameraConfiguration::default().with_plugin(scanner.clone()));
    controller.initialize().await.unwrap();
    session.push_frame(frame());

    assert!(wait_until(|| !scanner.current().is_empty()).await);
    let current = scanner.current();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].format, BarcodeFormat::QrCode);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_text_recognizer_publishes_result() {
    let recognizer = Arc::new(TextRecognizer::with_level(
        Arc::new(
            |_: &CameraFrame, level: RecognitionLevel| -> Result<Option<TextResult>, DetectorError> {
                assert_eq!(level, RecognitionLevel::Fast);
                Ok(Some(TextResult::from_plain("hello world\nsecond line")))
            },
        ),
        RecognitionLevel::Fast,
    ));
    let (controller, session) =
        controller(CameraConfiguration::default().with_plugin(recognizer.clone()));
    let mut text = recognizer.text();
    assert!(text.get().is_none());

    controller.initialize().await.unwrap();
    session.push_frame(frame());

    let result = tokio::time::timeout(WAIT, text.changed())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(result.text, "hello world\nsecond line");
    assert_eq!(result.blocks[0].lines.len(), 2);
    assert_eq!(result.blocks[0].lines[0].elements.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_plugins_attach_once_per_id() {
    let scanner = Arc::new(BarcodeScanner::with_detector(Arc::new(
        |_: &CameraFrame| -> Result<Vec<Barcode>, DetectorError> { Ok(Vec::new()) },
    )));
    let (controller, _session) =
        controller(CameraConfiguration::default().with_plugin(scanner.clone()));

    controller.initialize().await.unwrap();
    controller.initialize().await.unwrap();
    assert_eq!(controller.frame_listeners().len(), 1);

    scanner.on_detach();
    assert!(controller.frame_listeners().is_empty());
}
