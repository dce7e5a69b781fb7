//! Contracts for the camera parameter layer the controllers write to.
//!
//! The engine decides target values and search progress; the actual
//! device write path lives behind [`DeviceControl`]. Brightness gain can be
//! redirected to a host-side [`GainActuator`] bound with
//! [`Manager::set_host_gain`](crate::manager::Manager::set_host_gain), which
//! is also where white balance writes its per-channel gains.

use afl_core::{AflError, AflResult, Image, Limit, Range};
use parking_lot::Mutex;

/// Camera parameters an auto-feature evaluation may read and write.
///
/// Every method defaults to `NotSupported`, so a device only implements what
/// it actually has. Out-of-range writes are rejected by the device.
pub trait DeviceControl: Send + Sync {
    /// Exposure time range in microseconds.
    fn exposure_range(&self) -> AflResult<Range<f64>> {
        Err(AflError::not_supported("exposure"))
    }

    /// Current exposure time in microseconds.
    fn exposure(&self) -> AflResult<f64> {
        Err(AflError::not_supported("exposure"))
    }

    /// Write the exposure time in microseconds.
    fn set_exposure(&self, _exposure_us: f64) -> AflResult<()> {
        Err(AflError::not_supported("exposure"))
    }

    /// Analog gain range (linear factor).
    fn gain_range(&self) -> AflResult<Range<f64>> {
        Err(AflError::not_supported("analog gain"))
    }

    /// Current analog gain.
    fn gain(&self) -> AflResult<f64> {
        Err(AflError::not_supported("analog gain"))
    }

    /// Write the analog gain.
    fn set_gain(&self, _gain: f64) -> AflResult<()> {
        Err(AflError::not_supported("analog gain"))
    }

    /// Focus stepper range.
    fn focus_range(&self) -> AflResult<Limit> {
        Err(AflError::not_supported("focus"))
    }

    /// Current focus stepper position.
    fn focus(&self) -> AflResult<i32> {
        Err(AflError::not_supported("focus"))
    }

    /// Move the focus stepper.
    fn set_focus(&self, _position: i32) -> AflResult<()> {
        Err(AflError::not_supported("focus"))
    }
}

/// A device without any controllable parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDevice;

impl DeviceControl for NoDevice {}

/// Host-side gain sink used instead of the device's analog gain.
pub trait GainActuator: Send + Sync {
    /// Accepted master gain values.
    fn master_gain_range(&self) -> Range<f64>;
    /// Current master gain.
    fn master_gain(&self) -> f64;
    /// Write the master gain.
    fn set_master_gain(&self, gain: f64) -> AflResult<()>;

    /// Accepted per-channel gain values.
    fn color_gain_range(&self) -> Range<f64>;
    /// Current red, green and blue gains.
    fn color_gains(&self) -> [f64; 3];
    /// Write red, green and blue gains.
    fn set_color_gains(&self, gains: [f64; 3]) -> AflResult<()>;
}

/// Master gain accepted by [`HostGain`].
pub const HOST_MASTER_GAIN_RANGE: Range<f64> = Range::new(1.0, 8.0, 0.01);
/// Per-channel gain accepted by [`HostGain`].
pub const HOST_COLOR_GAIN_RANGE: Range<f64> = Range::new(0.25, 4.0, 0.01);

#[derive(Debug, Clone, Copy)]
struct HostGainState {
    master: f64,
    color: [f64; 3],
}

/// Gain applied in software to every acquired frame before processing.
#[derive(Debug)]
pub struct HostGain {
    state: Mutex<HostGainState>,
}

impl Default for HostGain {
    fn default() -> Self {
        Self::new()
    }
}

impl HostGain {
    /// Unity gains.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostGainState {
                master: 1.0,
                color: [1.0; 3],
            }),
        }
    }

    /// Multiply the pixels of an 8-bit image by the current gains, saturating at 255.
    ///
    /// Formats other than 8-bit mono, RGB, BGR and BGRA are left untouched.
    pub fn apply(&self, image: &mut Image) {
        use afl_core::PixelFormat;

        let HostGainState { master, color } = *self.state.lock();
        let scale = |v: u8, g: f64| (f64::from(v) * g).round().min(255.0) as u8;
        match image.format {
            PixelFormat::Mono8 => {
                for v in &mut image.data {
                    *v = scale(*v, master);
                }
            }
            PixelFormat::Rgb8 => {
                for px in image.data.chunks_exact_mut(3) {
                    for (c, v) in px.iter_mut().enumerate() {
                        *v = scale(*v, master * color[c]);
                    }
                }
            }
            PixelFormat::Bgr8 | PixelFormat::Bgra8 => {
                let step = image.format.bytes_per_pixel();
                for px in image.data.chunks_exact_mut(step) {
                    for c in 0..3 {
                        px[c] = scale(px[c], master * color[2 - c]);
                    }
                }
            }
            _ => {}
        }
    }
}

impl GainActuator for HostGain {
    fn master_gain_range(&self) -> Range<f64> {
        HOST_MASTER_GAIN_RANGE
    }

    fn master_gain(&self) -> f64 {
        self.state.lock().master
    }

    fn set_master_gain(&self, gain: f64) -> AflResult<()> {
        HOST_MASTER_GAIN_RANGE.validate("master gain", gain)?;
        self.state.lock().master = gain;
        Ok(())
    }

    fn color_gain_range(&self) -> Range<f64> {
        HOST_COLOR_GAIN_RANGE
    }

    fn color_gains(&self) -> [f64; 3] {
        self.state.lock().color
    }

    fn set_color_gains(&self, gains: [f64; 3]) -> AflResult<()> {
        for gain in gains {
            HOST_COLOR_GAIN_RANGE.validate("colour gain", gain)?;
        }
        self.state.lock().color = gains;
        Ok(())
    }
}
