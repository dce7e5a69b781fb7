//! # Rust AFL
//!
//! Auto-feature orchestration for camera pipelines. A [`Manager`] owns a set
//! of [`Controller`]s (brightness, white balance, autofocus), feeds each
//! processed frame to them and lets them drive the camera through a
//! [`device::DeviceControl`] implementation.
//!
//! ## Crate Structure
//!
//! - **`afl_core`** (re-exported): plain data types, tunable ranges and the
//!   [`AflError`] / [`StatusCode`] error model shared with integrations.
//! - **`library`**: the [`Library`] context that owns the controller arena,
//!   tracks the last error and reports the [`Version`].
//! - **`controller`**: controller handles, per-controller state machine,
//!   tunables and callbacks.
//! - **`manager`**: controller ownership and per-frame processing.
//! - **`algorithm`**: image statistics, brightness and white balance
//!   regulation, sharpness metrics and focus search strategies.
//! - **`device`**: the actuator traits controllers write to, plus a host-side
//!   gain stage.
//! - **`hardware`**: the simulated camera.
//! - **`config`** / **`telemetry`**: figment configuration and tracing setup
//!   for the `rust_afl` binary.
//!
//! ## Example
//!
//! ```rust
//! use rust_afl::hardware::SimulatedCamera;
//! use rust_afl::{ControllerType, Library, Manager, Mode, Status};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), rust_afl::AflError> {
//! let library = Library::init();
//! let camera = Arc::new(SimulatedCamera::new(64, 64, false));
//! let manager = Manager::new(&library, camera.clone())?;
//! let brightness = manager.create_controller(ControllerType::Brightness)?;
//! brightness.set_mode(Mode::Once)?;
//!
//! for _ in 0..40 {
//!     manager.process(&camera.capture())?;
//! }
//! assert_eq!(brightness.status()?, Status::Finished);
//! # Ok(())
//! # }
//! ```

pub mod algorithm;
pub mod config;
pub mod controller;
pub mod device;
pub mod hardware;
pub mod library;
pub mod manager;
pub mod telemetry;

mod arena;

pub use afl_core::{
    data, error, limits, range, types, AflError, AflResult, Algorithm, BrightnessComponent,
    ControllerType, Image, Limit, Mode, PixelFormat, Range, Rect, RoiCombination, RoiPreset,
    RoiWeight, SharpnessAlgorithm, Size, Status, StatusCode, WeightedRoi,
};
pub use controller::{Capabilities, Controller, Feature};
pub use library::{Library, Version};
pub use manager::Manager;
