// SPDX-License-Identifier: GPL-3.0-only
// Shared types for native session backends

//! Frame and region types shared by sessions, the controller and plugins

use crate::errors::SessionError;
use image::{GrayImage, RgbImage};
use std::sync::Arc;
use std::time::Instant;

/// Pixel layout of [`CameraFrame::data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    Rgba,
    /// RGB24 - 3 bytes per pixel
    Rgb,
    /// Gray8 - 8-bit single channel
    Gray,
    /// NV12 - Y plane followed by interleaved UV at half resolution
    Nv12,
}

impl PixelFormat {
    /// Bytes per pixel of the first plane
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Rgba => 4,
            PixelFormat::Rgb => 3,
            PixelFormat::Gray | PixelFormat::Nv12 => 1,
        }
    }

    /// Smallest row size for a frame `width` pixels wide, `None` on overflow
    ///
    /// NV12 rows also carry interleaved UV pairs, so odd widths round up.
    pub fn min_stride(&self, width: u32) -> Option<u32> {
        match self {
            PixelFormat::Nv12 => width.div_ceil(2).checked_mul(2),
            _ => width.checked_mul(self.bytes_per_pixel()),
        }
    }

    /// Total buffer size for a frame with the given stride
    pub fn buffer_len(&self, stride: u32, height: u32) -> usize {
        let plane = stride as usize * height as usize;
        match self {
            PixelFormat::Nv12 => plane + stride as usize * height.div_ceil(2) as usize,
            _ => plane,
        }
    }
}

/// One frame delivered by a native session
///
/// Pixel data is reference counted so the same frame can be handed to every
/// listener without copying.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    pub format: PixelFormat,
    /// Bytes per row of the first plane, may include padding
    pub stride: u32,
    /// Monotonic frame counter assigned by the session
    pub sequence: u64,
    /// When the frame left the native pipeline
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Build a frame, checking that `data` is large enough for the layout
    pub fn new(
        width: u32,
        height: u32,
        stride: u32,
        format: PixelFormat,
        data: impl Into<Arc<[u8]>>,
    ) -> Result<Self, SessionError> {
        let data = data.into();
        let min_stride = format.min_stride(width).ok_or_else(|| {
            SessionError::Encoding(format!("{}px wide {:?} frame is too large", width, format))
        })?;
        if stride < min_stride {
            return Err(SessionError::Encoding(format!(
                "stride {} too small for {}px wide {:?}",
                stride, width, format
            )));
        }
        let needed = format.buffer_len(stride, height);
        if data.len() < needed {
            return Err(SessionError::Encoding(format!(
                "frame buffer holds {} bytes, {}x{} {:?} needs {}",
                data.len(),
                width,
                height,
                format,
                needed
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            format,
            stride,
            sequence: 0,
            captured_at: Instant::now(),
        })
    }

    /// Tightly packed grayscale frame
    pub fn from_luma(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: Arc::from(image.as_raw().as_slice()),
            format: PixelFormat::Gray,
            stride: image.width(),
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Luminance of one pixel (BT.601 weights for RGB formats)
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        let row = y as usize * self.stride as usize;
        match self.format {
            PixelFormat::Gray | PixelFormat::Nv12 => self.data[row + x as usize],
            PixelFormat::Rgb | PixelFormat::Rgba => {
                let offset = row + (x * self.format.bytes_per_pixel()) as usize;
                let r = self.data[offset] as u32;
                let g = self.data[offset + 1] as u32;
                let b = self.data[offset + 2] as u32;
                ((r * 299 + g * 587 + b * 114) / 1000) as u8
            }
        }
    }

    /// Grayscale copy of the frame with stride padding removed
    pub fn to_luma_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([self.luma(x, y)])
        })
    }

    /// RGB copy of the frame for encoding
    pub fn to_rgb_image(&self) -> Result<RgbImage, SessionError> {
        let stride = self.stride as usize;
        let (w, h) = (self.width as usize, self.height as usize);
        let mut rgb = Vec::with_capacity(w * h * 3);

        match self.format {
            PixelFormat::Rgba | PixelFormat::Rgb => {
                let bpp = self.format.bytes_per_pixel() as usize;
                for y in 0..h {
                    let row = &self.data[y * stride..y * stride + w * bpp];
                    for px in row.chunks_exact(bpp) {
                        rgb.extend_from_slice(&px[..3]);
                    }
                }
            }
            PixelFormat::Gray => {
                for y in 0..h {
                    for &l in &self.data[y * stride..y * stride + w] {
                        rgb.extend_from_slice(&[l, l, l]);
                    }
                }
            }
            PixelFormat::Nv12 => {
                let uv_base = stride * h;
                for y in 0..h {
                    for x in 0..w {
                        let luma = self.data[y * stride + x] as f32;
                        let uv = uv_base + (y / 2) * stride + (x & !1);
                        let u = self.data[uv] as f32 - 128.0;
                        let v = self.data[uv + 1] as f32 - 128.0;
                        rgb.push((luma + 1.402 * v).clamp(0.0, 255.0) as u8);
                        rgb.push((luma - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
                        rgb.push((luma + 1.772 * u).clamp(0.0, 255.0) as u8);
                    }
                }
            }
        }

        RgbImage::from_raw(self.width, self.height, rgb)
            .ok_or_else(|| SessionError::Encoding("frame size mismatch".to_string()))
    }
}

/// A rectangular region within a frame
///
/// Coordinates are normalized (0.0 to 1.0) relative to the frame dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRegion {
    /// Left edge (0.0 = left of frame, 1.0 = right of frame)
    pub x: f32,
    /// Top edge (0.0 = top of frame, 1.0 = bottom of frame)
    pub y: f32,
    /// Width as fraction of frame width
    pub width: f32,
    /// Height as fraction of frame height
    pub height: f32,
}

impl FrameRegion {
    /// Create a frame region from pixel coordinates
    pub fn from_pixels(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        Self {
            x: x as f32 / frame_width as f32,
            y: y as f32 / frame_height as f32,
            width: width as f32 / frame_width as f32,
            height: height as f32 / frame_height as f32,
        }
    }

    /// Bounding box of a set of corner points, clamped to the frame
    pub fn from_corners(
        corners: &[(i32, i32)],
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        let clamp_x = |v: i32| v.clamp(0, frame_width as i32) as u32;
        let clamp_y = |v: i32| v.clamp(0, frame_height as i32) as u32;
        let min_x = corners.iter().map(|c| clamp_x(c.0)).min()?;
        let max_x = corners.iter().map(|c| clamp_x(c.0)).max()?;
        let min_y = corners.iter().map(|c| clamp_y(c.1)).min()?;
        let max_y = corners.iter().map(|c| clamp_y(c.1)).max()?;
        Some(Self::from_pixels(
            min_x,
            min_y,
            max_x - min_x,
            max_y - min_y,
            frame_width,
            frame_height,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_short_buffer() {
        assert!(CameraFrame::new(4, 4, 16, PixelFormat::Rgba, vec![0u8; 63]).is_err());
        assert!(CameraFrame::new(4, 4, 16, PixelFormat::Rgba, vec![0u8; 64]).is_ok());
        assert!(CameraFrame::new(4, 4, 8, PixelFormat::Rgba, vec![0u8; 64]).is_err());
    }

    #[test]
    fn test_luma_skips_stride_padding() {
        // 2x2 gray frame with 2 bytes of padding per row
        let data = vec![10, 20, 0xff, 0xff, 30, 40, 0xff, 0xff];
        let frame = CameraFrame::new(2, 2, 4, PixelFormat::Gray, data).unwrap();
        let luma = frame.to_luma_image();
        assert_eq!(luma.as_raw(), &vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_rgba_to_rgb() {
        let data = vec![255, 0, 0, 255, 0, 255, 0, 255];
        let frame = CameraFrame::new(2, 1, 8, PixelFormat::Rgba, data).unwrap();
        let rgb = frame.to_rgb_image().unwrap();
        assert_eq!(rgb.as_raw(), &vec![255, 0, 0, 0, 255, 0]);
        assert_eq!(frame.luma(1, 0), 149);
    }

    #[test]
    fn test_nv12_odd_height_needs_full_chroma_rows() {
        // 4x3: three luma rows plus two UV rows of 4 bytes
        assert!(CameraFrame::new(4, 3, 4, PixelFormat::Nv12, vec![128u8; 18]).is_err());
        let frame = CameraFrame::new(4, 3, 4, PixelFormat::Nv12, vec![128u8; 20]).unwrap();
        let rgb = frame.to_rgb_image().unwrap();
        assert_eq!(rgb.dimensions(), (4, 3));
        assert_eq!(rgb.get_pixel(3, 2).0, [128, 128, 128]);
    }

    #[test]
    fn test_nv12_odd_width_needs_even_stride() {
        assert!(CameraFrame::new(3, 2, 3, PixelFormat::Nv12, vec![128u8; 9]).is_err());
        let frame = CameraFrame::new(3, 2, 4, PixelFormat::Nv12, vec![128u8; 12]).unwrap();
        assert_eq!(frame.to_rgb_image().unwrap().dimensions(), (3, 2));
    }

    #[test]
    fn test_new_rejects_overflowing_width() {
        let err = CameraFrame::new(u32::MAX, 1, u32::MAX, PixelFormat::Rgba, vec![0u8; 4]);
        assert!(matches!(err, Err(SessionError::Encoding(_))));
    }

    #[test]
    fn test_region_from_corners() {
        let region = FrameRegion::from_corners(&[(10, 20), (50, 20), (50, 60), (-5, 60)], 100, 100)
            .unwrap();
        assert_eq!(region.x, 0.0);
        assert_eq!(region.y, 0.2);
        assert_eq!(region.width, 0.5);
        assert_eq!(region.height, 0.4);
        assert!(FrameRegion::from_corners(&[], 10, 10).is_none());
    }
}
