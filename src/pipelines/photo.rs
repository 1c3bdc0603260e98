// SPDX-License-Identifier: GPL-3.0-only

//! Photo pipeline: encode captured frames and write them out
//!
//! Encoding and file writes are CPU/IO bound and run on the blocking pool
//! so the caller's executor keeps servicing state updates.

use crate::backends::camera::{CameraFrame, StillCapture};
use crate::config::ImageFormat;
use crate::errors::{CameraException, SessionError, SessionResult};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Where a captured photo ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutput {
    /// Written to this file
    File(PathBuf),
    /// Kept in memory as encoded bytes
    Bytes(Arc<[u8]>),
}

/// Outcome of one `take_picture` call
#[derive(Debug, Clone)]
pub enum ImageCaptureResult {
    Success {
        width: u32,
        height: u32,
        output: CaptureOutput,
    },
    Error(CameraException),
}

impl ImageCaptureResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ImageCaptureResult::Success { .. })
    }

    pub fn error(&self) -> Option<&CameraException> {
        match self {
            ImageCaptureResult::Error(err) => Some(err),
            ImageCaptureResult::Success { .. } => None,
        }
    }

    /// File path, when the photo was saved to disk
    pub fn path(&self) -> Option<&Path> {
        match self {
            ImageCaptureResult::Success {
                output: CaptureOutput::File(path),
                ..
            } => Some(path),
            _ => None,
        }
    }
}

/// Destination for encoded photos
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoTarget {
    /// Save into this directory with a timestamped file name
    Directory(PathBuf),
    /// Return the encoded bytes to the caller
    Memory,
}

/// An encoded still image
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub data: Arc<[u8]>,
}

/// Encodes frames in one format
#[derive(Debug, Clone, Copy)]
pub struct PhotoEncoder {
    format: ImageFormat,
    jpeg_quality: u8,
}

impl PhotoEncoder {
    pub fn new(format: ImageFormat, jpeg_quality: u8) -> Self {
        Self {
            format,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Encode a frame on the blocking pool
    pub async fn encode(&self, frame: CameraFrame) -> SessionResult<EncodedImage> {
        let encoder = *self;
        tokio::task::spawn_blocking(move || encoder.encode_blocking(&frame))
            .await
            .map_err(|e| SessionError::Encoding(format!("encoding task failed: {}", e)))?
    }

    /// Turn a session's still capture into an encoded image
    pub async fn finish(&self, still: StillCapture) -> SessionResult<EncodedImage> {
        match still {
            StillCapture::Frame(frame) => self.encode(frame).await,
            StillCapture::Encoded {
                width,
                height,
                bytes,
            } => Ok(EncodedImage {
                width,
                height,
                format: self.format,
                data: bytes,
            }),
        }
    }

    pub fn encode_blocking(&self, frame: &CameraFrame) -> SessionResult<EncodedImage> {
        let rgb = frame.to_rgb_image()?;
        let data = match self.format {
            ImageFormat::Jpeg => encode_jpeg(&rgb, self.jpeg_quality)?,
            ImageFormat::Png => encode_png(&rgb)?,
        };
        debug!(
            width = frame.width,
            height = frame.height,
            format = ?self.format,
            size = data.len(),
            "Encoding complete"
        );
        Ok(EncodedImage {
            width: frame.width,
            height: frame.height,
            format: self.format,
            data: Arc::from(data),
        })
    }
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> SessionResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(buffer)
}

fn encode_png(image: &RgbImage) -> SessionResult<Vec<u8>> {
    let mut buffer = Vec::new();
    image.write_to(
        &mut std::io::Cursor::new(&mut buffer),
        image::ImageFormat::Png,
    )?;
    Ok(buffer)
}

/// Timestamped file name, e.g. `photo_20250101_120000_123.jpg`
pub fn photo_filename(format: ImageFormat) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
    format!("photo_{}.{}", timestamp, format.extension())
}

/// Deliver an encoded image to `target`
pub async fn store(encoded: EncodedImage, target: &PhotoTarget) -> SessionResult<CaptureOutput> {
    match target {
        PhotoTarget::Memory => Ok(CaptureOutput::Bytes(encoded.data)),
        PhotoTarget::Directory(dir) => {
            let path = dir.join(photo_filename(encoded.format));
            info!(path = %path.display(), "Saving photo");

            let dir = dir.clone();
            let write_path = path.clone();
            tokio::task::spawn_blocking(move || {
                std::fs::create_dir_all(&dir)?;
                std::fs::write(&write_path, &encoded.data)
            })
            .await
            .map_err(|e| SessionError::Io(format!("save task failed: {}", e)))??;

            Ok(CaptureOutput::File(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::PixelFormat;

    fn gray_frame() -> CameraFrame {
        CameraFrame::new(8, 8, 8, PixelFormat::Gray, vec![128u8; 64]).unwrap()
    }

    #[test]
    fn test_jpeg_and_png_signatures() {
        let jpeg = PhotoEncoder::new(ImageFormat::Jpeg, 90)
            .encode_blocking(&gray_frame())
            .unwrap();
        assert_eq!(&jpeg.data[..2], &[0xFF, 0xD8]);

        let png = PhotoEncoder::new(ImageFormat::Png, 90)
            .encode_blocking(&gray_frame())
            .unwrap();
        assert_eq!(&png.data[..4], &[0x89, b'P', b'N', b'G']);
        assert_eq!((png.width, png.height), (8, 8));
    }

    #[test]
    fn test_filename_extension() {
        let name = photo_filename(ImageFormat::Png);
        assert!(name.starts_with("photo_"));
        assert!(name.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_store_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = PhotoTarget::Directory(dir.path().join("nested"));
        let encoded = PhotoEncoder::new(ImageFormat::Jpeg, 80)
            .encode(gray_frame())
            .await
            .unwrap();

        let output = store(encoded, &target).await.unwrap();
        match output {
            CaptureOutput::File(path) => {
                assert!(path.starts_with(dir.path().join("nested")));
                assert!(std::fs::metadata(&path).unwrap().len() > 0);
            }
            CaptureOutput::Bytes(_) => panic!("expected a file"),
        }
    }
}
