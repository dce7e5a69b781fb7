//! Shared hard limits and factory defaults.
//!
//! This module centralizes:
//! - Frame size limits applied before any controller sees an image
//! - Tunable ranges and defaults reported by controllers
//! - Weighted ROI constraints

use crate::error::{AflError, AflResult};
use crate::range::{Limit, Range};
use crate::types::Size;

// =============================================================================
// Frame Limits
// =============================================================================

/// Maximum allowed frame payload in bytes (default: 256MB).
pub const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;
/// Maximum supported width/height for frames.
pub const MAX_FRAME_DIMENSION: u32 = 65_536;

/// Validated frame sizing information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    /// Number of pixels.
    pub pixels: usize,
    /// Number of payload bytes.
    pub bytes: usize,
}

/// Validate frame dimensions and calculate pixel/byte sizes safely.
pub fn validate_frame_size(
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> AflResult<FrameSize> {
    if width == 0 || height == 0 {
        return Err(AflError::InvalidImageFormat(format!(
            "empty frame {width}x{height}"
        )));
    }
    if width > MAX_FRAME_DIMENSION || height > MAX_FRAME_DIMENSION {
        return Err(AflError::InvalidImageFormat(format!(
            "frame {width}x{height} exceeds maximum dimension {MAX_FRAME_DIMENSION}"
        )));
    }

    let bytes = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(bytes_per_pixel).map(|b| (pixels, b)));
    let (pixels, bytes) = bytes.ok_or_else(|| {
        AflError::InvalidImageFormat(format!("frame {width}x{height} size overflows"))
    })?;

    if bytes > MAX_FRAME_BYTES {
        return Err(AflError::InvalidImageFormat(format!(
            "frame size {bytes} bytes exceeds maximum {MAX_FRAME_BYTES} bytes"
        )));
    }

    Ok(FrameSize { pixels, bytes })
}

// =============================================================================
// Tunable Ranges
// =============================================================================

/// Process every Nth eligible frame.
pub const SKIP_FRAMES_RANGE: Range<u32> = Range::new(1, 100, 1);
/// Default skip frames.
pub const DEFAULT_SKIP_FRAMES: u32 = 1;

/// Target brightness statistic (8-bit scale).
pub const AUTO_TARGET_RANGE: Range<u32> = Range::new(0, 255, 1);
/// Default brightness target.
pub const DEFAULT_AUTO_TARGET: u32 = 128;

/// Band around the target considered converged.
pub const AUTO_TOLERANCE_RANGE: Range<u32> = Range::new(0, 32, 1);
/// Default tolerance.
pub const DEFAULT_AUTO_TOLERANCE: u32 = 2;

/// Percentile of the brightest pixels kept in the statistic.
pub const AUTO_PERCENTILE_RANGE: Range<f64> = Range::new(0.0, 100.0, 0.1);
/// Default percentile (all pixels).
pub const DEFAULT_AUTO_PERCENTILE: f64 = 100.0;

/// Percentage sharpness drop tolerated before autofocus re-triggers.
pub const HYSTERESIS_RANGE: Range<u8> = Range::new(0, 100, 1);
/// Default hysteresis.
pub const DEFAULT_HYSTERESIS: u8 = 10;

/// Bounds accepted for either end of a focus search limit.
pub const LIMIT_RANGE: Range<i32> = Range::new(-32_768, 32_767, 1);

/// Default focus search limit, intersected with the device range at evaluation.
pub const DEFAULT_LIMIT: Limit = Limit { min: 0, max: 1023 };

// =============================================================================
// Weighted ROI
// =============================================================================

/// Smallest accepted weighted ROI.
pub const WEIGHTED_ROI_MIN_SIZE: Size = Size::new(32, 32);
/// Maximum number of weighted ROIs per controller.
pub const MAX_WEIGHTED_ROIS: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_frame_size() {
        let size = validate_frame_size(640, 480, 3).unwrap();
        assert_eq!(size.pixels, 640 * 480);
        assert_eq!(size.bytes, 640 * 480 * 3);

        assert!(matches!(
            validate_frame_size(0, 480, 1),
            Err(AflError::InvalidImageFormat(_))
        ));
        assert!(validate_frame_size(MAX_FRAME_DIMENSION + 1, 1, 1).is_err());
        assert!(validate_frame_size(MAX_FRAME_DIMENSION, MAX_FRAME_DIMENSION, 4).is_err());
    }

    #[test]
    fn test_defaults_inside_ranges() {
        assert!(SKIP_FRAMES_RANGE.contains(&DEFAULT_SKIP_FRAMES));
        assert!(AUTO_TARGET_RANGE.contains(&DEFAULT_AUTO_TARGET));
        assert!(AUTO_TOLERANCE_RANGE.contains(&DEFAULT_AUTO_TOLERANCE));
        assert!(AUTO_PERCENTILE_RANGE.contains(&DEFAULT_AUTO_PERCENTILE));
        assert!(HYSTERESIS_RANGE.contains(&DEFAULT_HYSTERESIS));
    }
}
