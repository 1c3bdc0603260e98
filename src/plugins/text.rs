// SPDX-License-Identifier: GPL-3.0-only

//! Text recognition plugin
//!
//! No OCR engine ships with the crate; hosts provide one through
//! [`TextDetector`]. The plugin handles dispatch and publishing.

use super::fanout::{AnalyzeFn, FrameAnalyzer};
use super::{CameraPlugin, DetectionStream, DetectorError};
use crate::backends::camera::{CameraFrame, FrameRegion};
use crate::controller::CameraController;
use std::sync::Arc;

/// Plugin id of [`TextRecognizer`]
pub const TEXT_RECOGNIZER_ID: &str = "TextRecognizer";

/// Speed/accuracy trade-off requested from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecognitionLevel {
    Fast,
    #[default]
    Accurate,
}

/// Smallest recognized unit, usually a word
#[derive(Debug, Clone, PartialEq)]
pub struct TextElement {
    pub text: String,
    pub bounds: Option<FrameRegion>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub elements: Vec<TextElement>,
    pub bounds: Option<FrameRegion>,
}

/// A paragraph-like group of lines
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub text: String,
    pub lines: Vec<TextLine>,
    pub bounds: Option<FrameRegion>,
}

/// Everything recognized in one frame
#[derive(Debug, Clone, PartialEq)]
pub struct TextResult {
    /// Full text, blocks separated by newlines
    pub text: String,
    pub blocks: Vec<TextBlock>,
}

impl TextElement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bounds: None,
        }
    }
}

impl TextLine {
    /// Line whose text is its elements joined by spaces
    pub fn from_elements(elements: Vec<TextElement>) -> Self {
        let text = elements
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            text,
            elements,
            bounds: None,
        }
    }
}

impl TextBlock {
    /// Block whose text is its lines joined by newlines
    pub fn from_lines(lines: Vec<TextLine>) -> Self {
        let text = lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            text,
            lines,
            bounds: None,
        }
    }
}

impl TextResult {
    pub fn from_blocks(blocks: Vec<TextBlock>) -> Self {
        let text = blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self { text, blocks }
    }

    /// Plain text with a single block/line split on whitespace
    pub fn from_plain(text: &str) -> Self {
        let lines = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| TextLine::from_elements(l.split_whitespace().map(TextElement::new).collect()))
            .collect();
        Self::from_blocks(vec![TextBlock::from_lines(lines)])
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Recognizes text in one frame; `Ok(None)` means no text
pub trait TextDetector: Send + Sync {
    fn recognize(
        &self,
        frame: &CameraFrame,
        level: RecognitionLevel,
    ) -> Result<Option<TextResult>, DetectorError>;
}

impl<F> TextDetector for F
where
    F: Fn(&CameraFrame, RecognitionLevel) -> Result<Option<TextResult>, DetectorError>
        + Send
        + Sync,
{
    fn recognize(
        &self,
        frame: &CameraFrame,
        level: RecognitionLevel,
    ) -> Result<Option<TextResult>, DetectorError> {
        self(frame, level)
    }
}

/// Plugin publishing the text of the latest analyzed frame
pub struct TextRecognizer {
    level: RecognitionLevel,
    analyzer: FrameAnalyzer<Option<TextResult>>,
}

impl TextRecognizer {
    pub fn new(detector: Arc<dyn TextDetector>) -> Self {
        Self::with_level(detector, RecognitionLevel::default())
    }

    pub fn with_level(detector: Arc<dyn TextDetector>, level: RecognitionLevel) -> Self {
        let analyze: Arc<AnalyzeFn<Option<TextResult>>> =
            Arc::new(move |frame: &CameraFrame| -> Result<_, DetectorError> {
                let result = detector.recognize(frame, level)?;
                Ok(result.filter(|r| !r.is_empty()))
            });
        Self {
            level,
            analyzer: FrameAnalyzer::new(TEXT_RECOGNIZER_ID, None, analyze),
        }
    }

    pub fn level(&self) -> RecognitionLevel {
        self.level
    }

    /// Latest-value stream of recognized text
    pub fn text(&self) -> DetectionStream<Option<TextResult>> {
        self.analyzer.stream()
    }

    pub fn current(&self) -> Option<TextResult> {
        self.analyzer.current()
    }

    pub fn frames_dropped(&self) -> u64 {
        self.analyzer.frames_dropped()
    }

    pub fn is_attached(&self) -> bool {
        self.analyzer.is_attached()
    }
}

impl CameraPlugin for TextRecognizer {
    fn id(&self) -> &str {
        TEXT_RECOGNIZER_ID
    }

    fn on_attach(&self, controller: &dyn CameraController) {
        self.analyzer.attach(controller);
    }

    fn on_detach(&self) {
        self.analyzer.detach();
    }
}
