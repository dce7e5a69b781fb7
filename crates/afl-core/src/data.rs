//! Decoded frames handed to the manager for evaluation.
//!
//! Pixel layout:
//! - 8-bit mono: 1 byte per pixel.
//! - 10/12/16-bit mono: 2 bytes per pixel, Little Endian, right-aligned.
//! - RGB/BGR: 3 bytes per pixel, BGRA: 4 bytes per pixel.
//!
//! Sampling helpers return values on an 8-bit scale regardless of bit depth,
//! so brightness targets mean the same thing for every format.

use crate::error::{AflError, AflResult};
use crate::limits::{validate_frame_size, FrameSize};
use serde::{Deserialize, Serialize};

/// Pixel format of an [`Image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 8-bit mono.
    Mono8,
    /// 10-bit mono in 16-bit words.
    Mono10,
    /// 12-bit mono in 16-bit words.
    Mono12,
    /// 16-bit mono.
    Mono16,
    /// Packed 8-bit RGB.
    Rgb8,
    /// Packed 8-bit BGR.
    Bgr8,
    /// Packed 8-bit BGRA.
    Bgra8,
    /// Packed YCbCr 4:2:2. Carried through acquisition but never evaluated.
    YCbCr422,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Mono8 => 1,
            PixelFormat::Mono10 | PixelFormat::Mono12 | PixelFormat::Mono16 => 2,
            PixelFormat::YCbCr422 => 2,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Bgra8 => 4,
        }
    }

    /// Significant bits per channel.
    pub fn bit_depth(self) -> u32 {
        match self {
            PixelFormat::Mono10 => 10,
            PixelFormat::Mono12 => 12,
            PixelFormat::Mono16 => 16,
            _ => 8,
        }
    }

    /// Whether the format carries colour channels.
    pub fn is_color(self) -> bool {
        matches!(
            self,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 | PixelFormat::Bgra8 | PixelFormat::YCbCr422
        )
    }

    /// Whether controllers can evaluate this format.
    pub fn is_supported(self) -> bool {
        !matches!(self, PixelFormat::YCbCr422)
    }
}

/// A decoded camera frame.
#[derive(Debug, Clone)]
pub struct Image {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Pixel format
    pub format: PixelFormat,

    /// Raw pixel data
    pub data: Vec<u8>,
}

impl Image {
    /// Create an image from raw bytes with an explicit format.
    ///
    /// The buffer is not checked here; [`Image::validate`] does that.
    pub fn from_bytes(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    /// Create an 8-bit mono image.
    pub fn from_mono8(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self::from_bytes(width, height, PixelFormat::Mono8, data)
    }

    /// Create a packed RGB image.
    pub fn from_rgb8(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self::from_bytes(width, height, PixelFormat::Rgb8, data)
    }

    /// Create a 16-bit-word mono image from pixel values.
    pub fn from_u16(width: u32, height: u32, format: PixelFormat, pixels: &[u16]) -> Self {
        let mut data = Vec::with_capacity(pixels.len() * 2);
        for pixel in pixels {
            data.extend_from_slice(&pixel.to_le_bytes());
        }
        Self::from_bytes(width, height, format, data)
    }

    /// Check that the format is evaluable and the buffer matches the dimensions.
    pub fn validate(&self) -> AflResult<FrameSize> {
        if !self.format.is_supported() {
            return Err(AflError::InvalidImageFormat(format!(
                "pixel format {:?} cannot be evaluated",
                self.format
            )));
        }
        let size = validate_frame_size(self.width, self.height, self.format.bytes_per_pixel())?;
        if self.data.len() < size.bytes {
            return Err(AflError::InvalidImageFormat(format!(
                "buffer holds {} bytes, {}x{} {:?} needs {}",
                self.data.len(),
                self.width,
                self.height,
                self.format,
                size.bytes
            )));
        }
        Ok(size)
    }

    /// Whether the image carries colour channels.
    pub fn is_color(&self) -> bool {
        self.format.is_color()
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y as usize * self.width as usize + x as usize;
        Some(idx * self.format.bytes_per_pixel())
    }

    /// Red, green and blue at (x, y) on an 8-bit scale. Mono pixels report equal channels.
    pub fn rgb(&self, x: u32, y: u32) -> Option<[f64; 3]> {
        let start = self.offset(x, y)?;
        let px = |i: usize| self.data.get(start + i).map(|&v| f64::from(v));
        match self.format {
            PixelFormat::Mono8 => px(0).map(|v| [v; 3]),
            PixelFormat::Mono10 | PixelFormat::Mono12 | PixelFormat::Mono16 => {
                let lo = *self.data.get(start)?;
                let hi = *self.data.get(start + 1)?;
                let raw = f64::from(u16::from_le_bytes([lo, hi]));
                let scale = 255.0 / f64::from((1u32 << self.format.bit_depth()) - 1);
                Some([raw * scale; 3])
            }
            PixelFormat::Rgb8 => Some([px(0)?, px(1)?, px(2)?]),
            PixelFormat::Bgr8 | PixelFormat::Bgra8 => Some([px(2)?, px(1)?, px(0)?]),
            PixelFormat::YCbCr422 => None,
        }
    }

    /// Luma at (x, y) on an 8-bit scale (Rec. 601 weights for colour formats).
    pub fn luma(&self, x: u32, y: u32) -> Option<f64> {
        let [r, g, b] = self.rgb(x, y)?;
        if self.is_color() {
            Some(0.299 * r + 0.587 * g + 0.114 * b)
        } else {
            Some(r)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_short_buffer() {
        let img = Image::from_mono8(4, 4, vec![0; 15]);
        assert!(matches!(
            img.validate(),
            Err(AflError::InvalidImageFormat(_))
        ));
        let img = Image::from_mono8(4, 4, vec![0; 16]);
        assert_eq!(img.validate().unwrap().pixels, 16);
    }

    #[test]
    fn test_unsupported_format() {
        let img = Image::from_bytes(2, 2, PixelFormat::YCbCr422, vec![0; 8]);
        assert!(matches!(
            img.validate(),
            Err(AflError::InvalidImageFormat(_))
        ));
    }

    #[test]
    fn test_sampling_scales_to_8_bit() {
        let img = Image::from_u16(2, 1, PixelFormat::Mono12, &[4095, 0]);
        assert_eq!(img.luma(0, 0), Some(255.0));
        assert_eq!(img.luma(1, 0), Some(0.0));
        assert_eq!(img.luma(2, 0), None);

        let img = Image::from_bytes(1, 1, PixelFormat::Bgr8, vec![10, 20, 30]);
        assert_eq!(img.rgb(0, 0), Some([30.0, 20.0, 10.0]));
        assert!(img.is_color());
    }
}
