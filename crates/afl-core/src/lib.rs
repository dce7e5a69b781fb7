//! `afl-core`
//!
//! Core value types and the error taxonomy shared by the auto-feature
//! controllers and the manager in `rust_afl`.
//!
//! This crate is a leaf: it knows nothing about devices, threads or
//! callbacks. It defines what a controller is configured with and what a
//! failed operation reports.
//!
//! ## Key Types
//!
//! - [`AflError`] / [`StatusCode`]: one error variant per non-success status code
//! - [`Range`] / [`Limit`]: quantized tunable ranges and signed min/max pairs
//! - [`ControllerType`], [`Mode`], [`Status`]: controller identity and state
//! - [`Rect`], [`WeightedRoi`]: regions of interest in sensor pixel coordinates
//! - [`Image`]: a decoded frame handed to the manager for evaluation
//!
//! ## Example
//!
//! ```rust
//! use afl_core::{Range, Rect, WeightedRoi, RoiWeight};
//!
//! let skip = Range::new(1u32, 100, 1);
//! assert!(skip.contains(&100));
//!
//! let roi = WeightedRoi::new(Rect::new(0, 0, 32, 32), RoiWeight::Strong);
//! assert_eq!(roi.weight.factor(), 3.0);
//! ```

pub mod data;
pub mod error;
pub mod limits;
pub mod range;
pub mod types;

pub use data::{Image, PixelFormat};
pub use error::{AflError, AflResult, StatusCode};
pub use range::{Limit, Range};
pub use types::{
    Algorithm, BrightnessComponent, ControllerType, Mode, Rect, RoiCombination, RoiPreset,
    RoiWeight, SharpnessAlgorithm, Size, Status, WeightedRoi,
};
