// SPDX-License-Identifier: GPL-3.0-only

//! Frame-analysis plugins
//!
//! A plugin owns one detector and one detection stream. Attaching it to a
//! controller registers a single frame listener; every frame the detector
//! accepts replaces the published value. Detaching unregisters the listener
//! and freezes the stream at its last value.
//!
//! - [`BarcodeScanner`]: barcodes via a [`BarcodeDetector`] (QR by default)
//! - [`TextRecognizer`]: text via a [`TextDetector`]
//!
//! Both are thin wrappers around [`FrameAnalyzer`], which implements the
//! latest-frame-wins dispatch shared by all plugins.

pub mod barcode;
pub mod fanout;
pub mod qr_detector;
pub mod text;

pub use barcode::{Barcode, BarcodeDetector, BarcodeFormat, BarcodeScanner, BarcodeValue};
pub use fanout::FrameAnalyzer;
pub use qr_detector::QrDetector;
pub use text::{
    RecognitionLevel, TextBlock, TextDetector, TextElement, TextLine, TextRecognizer, TextResult,
};

use crate::controller::CameraController;
use futures::Stream;
use std::fmt;
use tokio::sync::watch;

/// A unit of frame analysis attached to a controller
pub trait CameraPlugin: Send + Sync {
    /// Unique, stable identifier
    fn id(&self) -> &str;

    /// Start observing frames of `controller`
    fn on_attach(&self, controller: &dyn CameraController);

    /// Stop observing; the detection stream keeps its last value
    fn on_detach(&self);
}

/// Failure of a detector on one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorError {
    /// The frame layout is not something this detector reads
    UnsupportedFrame(String),
    /// The detector ran and failed
    Failed(String),
}

impl fmt::Display for DetectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorError::UnsupportedFrame(msg) => write!(f, "Unsupported frame: {}", msg),
            DetectorError::Failed(msg) => write!(f, "Detection failed: {}", msg),
        }
    }
}

impl std::error::Error for DetectorError {}

/// Read side of a plugin's latest-value stream
#[derive(Debug, Clone)]
pub struct DetectionStream<T> {
    receiver: watch::Receiver<T>,
}

impl<T: Clone + Send + Sync + 'static> DetectionStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<T>) -> Self {
        Self { receiver }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.receiver.borrow().clone()
    }

    /// A fresh receiver positioned at the current value
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.receiver.clone()
    }

    /// Wait for the next published value
    ///
    /// Returns `None` once the owning plugin is dropped.
    pub async fn changed(&mut self) -> Option<T> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Current value followed by every update
    pub fn into_stream(self) -> impl Stream<Item = T> {
        let mut receiver = self.receiver;
        async_stream::stream! {
            let current = receiver.borrow_and_update().clone();
            yield current;
            while receiver.changed().await.is_ok() {
                let next = receiver.borrow_and_update().clone();
                yield next;
            }
        }
    }
}
