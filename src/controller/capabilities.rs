//! Typed capability descriptor.
//!
//! The feature set of a controller is fixed by its type at creation. It is
//! fetched once as a [`Capabilities`] value instead of being re-queried
//! before every call; every setter and getter still checks it and fails with
//! `NotSupported` when the feature is absent.

use afl_core::{AflError, AflResult, ControllerType};
use serde::Serialize;
use std::fmt;

/// A configurable feature of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Process every Nth frame.
    SkipFrames,
    /// Single evaluation rectangle.
    Roi,
    /// Weighted evaluation rectangles.
    WeightedRoi,
    /// Named ROI placement.
    RoiPreset,
    /// Global Off/Continuous/Once mode.
    Mode,
    /// Separate exposure and gain modes.
    BrightnessComponentMode,
    /// Brightness target.
    AutoTarget,
    /// Band around the target.
    AutoTolerance,
    /// Brightest-pixel percentile kept in the statistic.
    AutoPercentile,
    /// Search strategy.
    Algorithm,
    /// Sharpness metric.
    SharpnessAlgorithm,
    /// Actuator search limit.
    Limit,
    /// Re-trigger damping.
    Hysteresis,
    /// Last measured statistic.
    AutoAverage,
    /// Per-sample data callback.
    DataProcessing,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Feature::SkipFrames => "skip frames",
            Feature::Roi => "ROI",
            Feature::WeightedRoi => "weighted ROI",
            Feature::RoiPreset => "ROI preset",
            Feature::Mode => "mode",
            Feature::BrightnessComponentMode => "brightness component mode",
            Feature::AutoTarget => "auto target",
            Feature::AutoTolerance => "auto tolerance",
            Feature::AutoPercentile => "auto percentile",
            Feature::Algorithm => "algorithm",
            Feature::SharpnessAlgorithm => "sharpness algorithm",
            Feature::Limit => "limit",
            Feature::Hysteresis => "hysteresis",
            Feature::AutoAverage => "auto average",
            Feature::DataProcessing => "data processing callback",
        };
        write!(f, "{}", label)
    }
}

/// Feature set of one controller type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    /// Frame decimation between evaluations.
    pub skip_frames: bool,
    /// Single evaluation rectangle.
    pub roi: bool,
    /// Weighted ROI list.
    pub weighted_roi: bool,
    /// Named ROI placement.
    pub roi_preset: bool,
    /// Global Off/Continuous/Once mode.
    pub mode: bool,
    /// Independent exposure and gain modes.
    pub brightness_component_mode: bool,
    /// Brightness target.
    pub auto_target: bool,
    /// Brightness tolerance.
    pub auto_tolerance: bool,
    /// Brightness percentile.
    pub auto_percentile: bool,
    /// Focus search strategy.
    pub algorithm: bool,
    /// Sharpness metric.
    pub sharpness_algorithm: bool,
    /// Focus search bounds.
    pub limit: bool,
    /// Continuous focus re-trigger threshold.
    pub hysteresis: bool,
    /// Last measured averages.
    pub auto_average: bool,
    /// Per-sample focus data callback.
    pub data_processing: bool,
}

impl Capabilities {
    /// Features provided by a controller type.
    pub fn for_type(kind: ControllerType) -> Self {
        let common = Capabilities {
            skip_frames: true,
            mode: true,
            ..Default::default()
        };
        match kind {
            ControllerType::Brightness => Capabilities {
                roi: true,
                roi_preset: true,
                brightness_component_mode: true,
                auto_target: true,
                auto_tolerance: true,
                auto_percentile: true,
                auto_average: true,
                ..common
            },
            ControllerType::WhiteBalance => Capabilities {
                roi: true,
                roi_preset: true,
                auto_average: true,
                ..common
            },
            ControllerType::Autofocus => Capabilities {
                weighted_roi: true,
                algorithm: true,
                sharpness_algorithm: true,
                limit: true,
                hysteresis: true,
                data_processing: true,
                ..common
            },
        }
    }

    /// Whether a feature is available.
    pub fn supports(&self, feature: Feature) -> bool {
        match feature {
            Feature::SkipFrames => self.skip_frames,
            Feature::Roi => self.roi,
            Feature::WeightedRoi => self.weighted_roi,
            Feature::RoiPreset => self.roi_preset,
            Feature::Mode => self.mode,
            Feature::BrightnessComponentMode => self.brightness_component_mode,
            Feature::AutoTarget => self.auto_target,
            Feature::AutoTolerance => self.auto_tolerance,
            Feature::AutoPercentile => self.auto_percentile,
            Feature::Algorithm => self.algorithm,
            Feature::SharpnessAlgorithm => self.sharpness_algorithm,
            Feature::Limit => self.limit,
            Feature::Hysteresis => self.hysteresis,
            Feature::AutoAverage => self.auto_average,
            Feature::DataProcessing => self.data_processing,
        }
    }

    /// Fail with `NotSupported` unless the feature is available.
    pub fn require(&self, feature: Feature) -> AflResult<()> {
        if self.supports(feature) {
            Ok(())
        } else {
            Err(AflError::not_supported(feature))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_has_mode_and_skip_frames() {
        for kind in ControllerType::ALL {
            let caps = Capabilities::for_type(kind);
            assert!(caps.supports(Feature::Mode));
            assert!(caps.supports(Feature::SkipFrames));
        }
    }

    #[test]
    fn test_autofocus_features() {
        let caps = Capabilities::for_type(ControllerType::Autofocus);
        assert!(caps.require(Feature::WeightedRoi).is_ok());
        assert!(caps.require(Feature::Hysteresis).is_ok());
        assert!(matches!(
            caps.require(Feature::Roi),
            Err(AflError::NotSupported(_))
        ));
        assert!(caps.require(Feature::AutoAverage).is_err());
    }

    #[test]
    fn test_brightness_components_only_on_brightness() {
        assert!(Capabilities::for_type(ControllerType::Brightness).brightness_component_mode);
        assert!(!Capabilities::for_type(ControllerType::WhiteBalance).brightness_component_mode);
        assert!(!Capabilities::for_type(ControllerType::Autofocus).brightness_component_mode);
    }
}
