//! Evaluation algorithms behind the controllers.
//!
//! - [`statistics`]: ROI resolution, brightness statistics, weighted-ROI maps
//! - [`brightness`]: exposure/gain correction towards a target
//! - [`white_balance`]: grey-world colour gains
//! - [`sharpness`]: focus metrics
//! - [`search`] / [`focus`]: frame-sequential autofocus

pub mod brightness;
pub mod focus;
pub mod search;
pub mod sharpness;
pub mod statistics;
pub mod white_balance;
