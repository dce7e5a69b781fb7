//! Simulated camera.
//!
//! Renders a textured test scene whose response follows the parameters the
//! controllers write:
//! - brightness scales linearly with exposure time and analog gain
//! - texture contrast falls off with distance from the best focus position
//! - colour frames carry a fixed red/blue cast for white balance to remove
//!
//! Used by the CLI, the integration tests and the benches in place of a real
//! device.

use crate::config::SimulationConfig;
use crate::device::DeviceControl;
use afl_core::{AflResult, Image, Limit, PixelFormat, Range};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

/// Exposure range in microseconds.
pub const EXPOSURE_RANGE: Range<f64> = Range::new(10.0, 100_000.0, 1.0);
/// Analog gain range.
pub const GAIN_RANGE: Range<f64> = Range::new(1.0, 16.0, 0.01);
/// Focus stepper range.
pub const FOCUS_RANGE: Limit = Limit { min: 0, max: 1023 };

/// Exposure at which a mid-grey scene renders at half scale with unity gain.
const REFERENCE_EXPOSURE_US: f64 = 10_000.0;
/// Focus distance at which texture contrast halves.
const DEFOCUS_HALF_CONTRAST: f64 = 120.0;
/// Red, green, blue response of the simulated sensor.
const COLOR_CAST: [f64; 3] = [1.15, 1.0, 0.8];

#[derive(Debug, Clone, Copy)]
struct SimState {
    exposure_us: f64,
    gain: f64,
    focus: i32,
}

/// Camera simulation implementing [`DeviceControl`].
///
/// # Example
///
/// ```rust
/// use rust_afl::hardware::sim::SimulatedCamera;
/// use rust_afl::device::DeviceControl;
///
/// let camera = SimulatedCamera::new(64, 48, false);
/// camera.set_exposure(10_000.0).unwrap();
/// let frame = camera.capture();
/// assert_eq!(frame.width, 64);
/// ```
#[derive(Debug)]
pub struct SimulatedCamera {
    width: u32,
    height: u32,
    color: bool,
    best_focus: AtomicI32,
    noise: f64,
    texture: Vec<f32>,
    state: Mutex<SimState>,
    rng: Mutex<StdRng>,
    frame_count: AtomicU64,
}

impl SimulatedCamera {
    /// Create a noise-free camera with the best focus at 600.
    pub fn new(width: u32, height: u32, color: bool) -> Self {
        let texture = (0..height)
            .flat_map(|y| (0..width).map(move |x| texture_at(x, y)))
            .collect();
        Self {
            width,
            height,
            color,
            best_focus: AtomicI32::new(600),
            noise: 0.0,
            texture,
            state: Mutex::new(SimState {
                exposure_us: 2_000.0,
                gain: 1.0,
                focus: 0,
            }),
            rng: Mutex::new(StdRng::seed_from_u64(0)),
            frame_count: AtomicU64::new(0),
        }
    }

    /// Create a camera from the simulation section of the configuration.
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.width, config.height, config.color)
            .with_best_focus(config.best_focus)
            .with_noise(config.noise, config.seed)
    }

    /// Move the sharpest focus position.
    pub fn with_best_focus(self, position: i32) -> Self {
        self.set_best_focus(position);
        self
    }

    /// Move the scene so that `position` becomes the sharpest focus.
    pub fn set_best_focus(&self, position: i32) {
        self.best_focus.store(FOCUS_RANGE.clamp(position), Ordering::Relaxed);
    }

    /// Add uniform noise of `amplitude` grey levels from a seeded generator.
    pub fn with_noise(mut self, amplitude: f64, seed: u64) -> Self {
        self.noise = amplitude.max(0.0);
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Set the starting exposure, gain and focus.
    pub fn with_initial(self, exposure_us: f64, gain: f64, focus: i32) -> Self {
        *self.state.lock() = SimState {
            exposure_us: EXPOSURE_RANGE.clamp(exposure_us),
            gain: GAIN_RANGE.clamp(gain),
            focus: FOCUS_RANGE.clamp(focus),
        };
        self
    }

    /// Position of the sharpest focus.
    pub fn best_focus(&self) -> i32 {
        self.best_focus.load(Ordering::Relaxed)
    }

    /// Number of frames captured.
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Render a frame with the current parameters.
    pub fn capture(&self) -> Image {
        let state = *self.state.lock();
        self.frame_count.fetch_add(1, Ordering::Relaxed);

        let defocus = f64::from(state.focus - self.best_focus()) / DEFOCUS_HALF_CONTRAST;
        let contrast = 1.0 / (1.0 + defocus * defocus);
        let scale = state.exposure_us / REFERENCE_EXPOSURE_US * state.gain * 255.0;

        let channels = if self.color { 3 } else { 1 };
        let mut data = Vec::with_capacity(self.texture.len() * channels);
        let mut rng = self.rng.lock();
        for &t in &self.texture {
            let reflectance = 0.5 + 0.35 * f64::from(t) * contrast;
            let base = reflectance * scale;
            if self.color {
                for cast in COLOR_CAST {
                    data.push(self.quantize(base * cast, &mut rng));
                }
            } else {
                data.push(self.quantize(base, &mut rng));
            }
        }
        let format = if self.color {
            PixelFormat::Rgb8
        } else {
            PixelFormat::Mono8
        };
        Image::from_bytes(self.width, self.height, format, data)
    }

    fn quantize(&self, value: f64, rng: &mut StdRng) -> u8 {
        let noisy = if self.noise > 0.0 {
            value + rng.gen_range(-self.noise..=self.noise)
        } else {
            value
        };
        noisy.round().clamp(0.0, 255.0) as u8
    }
}

/// Scene texture in [-1, 1]: a fine sinusoidal grid over a coarse checkerboard.
fn texture_at(x: u32, y: u32) -> f32 {
    let fine = (x as f32 * 0.8).sin() * (y as f32 * 0.8).sin();
    let checker = if ((x / 8) + (y / 8)) % 2 == 0 { 1.0 } else { -1.0 };
    0.6 * fine + 0.4 * checker
}

impl DeviceControl for SimulatedCamera {
    fn exposure_range(&self) -> AflResult<Range<f64>> {
        Ok(EXPOSURE_RANGE)
    }

    fn exposure(&self) -> AflResult<f64> {
        Ok(self.state.lock().exposure_us)
    }

    fn set_exposure(&self, exposure_us: f64) -> AflResult<()> {
        self.state.lock().exposure_us = EXPOSURE_RANGE.validate("exposure", exposure_us)?;
        Ok(())
    }

    fn gain_range(&self) -> AflResult<Range<f64>> {
        Ok(GAIN_RANGE)
    }

    fn gain(&self) -> AflResult<f64> {
        Ok(self.state.lock().gain)
    }

    fn set_gain(&self, gain: f64) -> AflResult<()> {
        self.state.lock().gain = GAIN_RANGE.validate("gain", gain)?;
        Ok(())
    }

    fn focus_range(&self) -> AflResult<Limit> {
        Ok(FOCUS_RANGE)
    }

    fn focus(&self) -> AflResult<i32> {
        Ok(self.state.lock().focus)
    }

    fn set_focus(&self, position: i32) -> AflResult<()> {
        let range = Range::new(FOCUS_RANGE.min, FOCUS_RANGE.max, 1);
        self.state.lock().focus = range.validate("focus", position)?;
        Ok(())
    }
}
