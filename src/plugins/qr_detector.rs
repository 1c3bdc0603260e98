// SPDX-License-Identifier: GPL-3.0-only

//! QR code detector
//!
//! Converts frames to grayscale, downscales large frames for real-time
//! speed, and decodes every QR grid rqrr finds. Bounds are reported in
//! normalized coordinates of the original frame.

use super::barcode::{Barcode, BarcodeDetector, BarcodeFormat};
use super::DetectorError;
use crate::backends::camera::{CameraFrame, FrameRegion};
use crate::constants::detection::QR_MAX_DIMENSION;
use image::imageops::FilterType;
use tracing::{debug, trace};

/// QR code detector backed by rqrr
#[derive(Debug, Clone)]
pub struct QrDetector {
    /// Frames are downscaled so their longest side is at most this
    max_dimension: u32,
}

impl Default for QrDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl QrDetector {
    pub fn new() -> Self {
        Self {
            max_dimension: QR_MAX_DIMENSION,
        }
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(64),
        }
    }
}

impl BarcodeDetector for QrDetector {
    fn detect(&self, frame: &CameraFrame) -> Result<Vec<Barcode>, DetectorError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(DetectorError::UnsupportedFrame("empty frame".to_string()));
        }
        let start = std::time::Instant::now();

        let luma = frame.to_luma_image();
        let longest = frame.width.max(frame.height);
        let (luma, scale) = if longest > self.max_dimension {
            let scale = longest as f32 / self.max_dimension as f32;
            let w = ((frame.width as f32 / scale) as u32).max(1);
            let h = ((frame.height as f32 / scale) as u32).max(1);
            (image::imageops::resize(&luma, w, h, FilterType::Triangle), scale)
        } else {
            (luma, 1.0)
        };

        trace!(
            proc_width = luma.width(),
            proc_height = luma.height(),
            scale,
            conversion_ms = start.elapsed().as_millis(),
            "Prepared grayscale image for QR detection"
        );

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            luma.width() as usize,
            luma.height() as usize,
            |x, y| luma.get_pixel(x as u32, y as u32).0[0],
        );
        let grids = prepared.detect_grids();

        let mut barcodes = Vec::with_capacity(grids.len());
        for grid in grids {
            let content = match grid.decode() {
                Ok((_meta, content)) => content,
                Err(e) => {
                    debug!(error = ?e, "Failed to decode QR grid");
                    continue;
                }
            };

            let corners: Vec<(i32, i32)> = grid
                .bounds
                .iter()
                .map(|p| ((p.x as f32 * scale) as i32, (p.y as f32 * scale) as i32))
                .collect();
            let mut barcode = Barcode::new(content, BarcodeFormat::QrCode);
            if let Some(bounds) = FrameRegion::from_corners(&corners, frame.width, frame.height) {
                barcode = barcode.with_bounds(bounds);
            }

            debug!(content = %barcode.raw_value, bounds = ?barcode.bounds, "Detected QR code");
            barcodes.push(barcode);
        }

        if !barcodes.is_empty() {
            debug!(
                count = barcodes.len(),
                total_ms = start.elapsed().as_millis(),
                "QR detection found codes"
            );
        }
        Ok(barcodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::PixelFormat;

    #[test]
    fn test_blank_frame_has_no_codes() {
        let frame = CameraFrame::new(320, 240, 320, PixelFormat::Gray, vec![255u8; 320 * 240])
            .unwrap();
        assert!(QrDetector::new().detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_large_frame_is_downscaled() {
        let frame = CameraFrame::new(2000, 100, 2000, PixelFormat::Gray, vec![0u8; 2000 * 100])
            .unwrap();
        assert!(QrDetector::with_max_dimension(200).detect(&frame).unwrap().is_empty());
    }
}
