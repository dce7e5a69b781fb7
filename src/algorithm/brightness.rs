//! Exposure and gain adjustment towards a brightness target.
//!
//! The correction is multiplicative: the ratio between target and measured
//! statistic is split across the active actuators. Brightening raises
//! exposure first and then gain; darkening lowers gain first and then
//! exposure, so noise stays as low as the exposure range allows.

use crate::device::{DeviceControl, GainActuator};
use afl_core::{AflResult, Range};

/// Largest correction applied in one step.
const MAX_STEP_FACTOR: f64 = 4.0;
/// Relative change below which an actuator counts as not having moved.
const MIN_RELATIVE_CHANGE: f64 = 1e-3;

/// Which actuators the evaluation may move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actuators {
    /// Exposure may move.
    pub exposure: bool,
    /// Gain may move.
    pub gain: bool,
}

/// Brightness target and tolerance band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessGoal {
    /// Target statistic on an 8-bit scale.
    pub target: f64,
    /// Accepted deviation from the target.
    pub tolerance: f64,
}

/// Result of one brightness step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessStep {
    /// The statistic is inside the band, or every active actuator is pinned.
    pub converged: bool,
    /// Exposure written this step.
    pub exposure_us: Option<f64>,
    /// Gain written this step.
    pub gain: Option<f64>,
}

/// Gain channel used by the brightness controller.
enum GainPath<'a> {
    Host(&'a dyn GainActuator),
    Device(&'a dyn DeviceControl),
}

impl GainPath<'_> {
    fn range(&self) -> AflResult<Range<f64>> {
        match self {
            GainPath::Host(g) => Ok(g.master_gain_range()),
            GainPath::Device(d) => d.gain_range(),
        }
    }

    fn get(&self) -> AflResult<f64> {
        match self {
            GainPath::Host(g) => Ok(g.master_gain()),
            GainPath::Device(d) => d.gain(),
        }
    }

    fn set(&self, value: f64) -> AflResult<()> {
        match self {
            GainPath::Host(g) => g.set_master_gain(value),
            GainPath::Device(d) => d.set_gain(value),
        }
    }
}

/// Scale one actuator by `factor` within its range; returns the factor actually applied.
fn scale_actuator(
    factor: f64,
    range: Range<f64>,
    current: f64,
    write: impl FnOnce(f64) -> AflResult<()>,
) -> AflResult<(f64, f64)> {
    let current = range.clamp(current);
    let wanted = range.clamp(current * factor);
    if current <= 0.0 || ((wanted - current) / current).abs() < MIN_RELATIVE_CHANGE {
        return Ok((1.0, current));
    }
    write(wanted)?;
    Ok((wanted / current, wanted))
}

/// Run one adjustment step for a measured statistic.
pub fn adjust(
    statistic: f64,
    goal: BrightnessGoal,
    actuators: Actuators,
    device: &dyn DeviceControl,
    host_gain: Option<&dyn GainActuator>,
) -> AflResult<BrightnessStep> {
    let mut step = BrightnessStep {
        converged: true,
        exposure_us: None,
        gain: None,
    };
    if (statistic - goal.target).abs() <= goal.tolerance {
        return Ok(step);
    }

    let gain_path = match host_gain {
        Some(g) => GainPath::Host(g),
        None => GainPath::Device(device),
    };
    let factor = (goal.target.max(1.0) / statistic.max(1.0))
        .clamp(1.0 / MAX_STEP_FACTOR, MAX_STEP_FACTOR);
    let brighten = factor > 1.0;

    let mut remaining = factor;
    let mut moved = false;

    let mut run_exposure = |remaining: &mut f64, step: &mut BrightnessStep| -> AflResult<()> {
        if !actuators.exposure {
            return Ok(());
        }
        let (applied, value) = scale_actuator(
            *remaining,
            device.exposure_range()?,
            device.exposure()?,
            |v| device.set_exposure(v),
        )?;
        if applied != 1.0 {
            moved = true;
            *remaining /= applied;
        }
        step.exposure_us = Some(value);
        Ok(())
    };
    let run_gain = |remaining: &mut f64, step: &mut BrightnessStep| -> AflResult<bool> {
        if !actuators.gain {
            return Ok(false);
        }
        let (applied, value) =
            scale_actuator(*remaining, gain_path.range()?, gain_path.get()?, |v| {
                gain_path.set(v)
            })?;
        step.gain = Some(value);
        if applied != 1.0 {
            *remaining /= applied;
            return Ok(true);
        }
        Ok(false)
    };

    let gain_moved = if brighten {
        run_exposure(&mut remaining, &mut step)?;
        run_gain(&mut remaining, &mut step)?
    } else {
        let g = run_gain(&mut remaining, &mut step)?;
        run_exposure(&mut remaining, &mut step)?;
        g
    };

    step.converged = !(moved || gain_moved);
    Ok(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HostGain;
    use parking_lot::Mutex;

    struct Device {
        exposure: Mutex<f64>,
        gain: Mutex<f64>,
    }

    impl Device {
        fn new(exposure: f64, gain: f64) -> Self {
            Self {
                exposure: Mutex::new(exposure),
                gain: Mutex::new(gain),
            }
        }
    }

    impl DeviceControl for Device {
        fn exposure_range(&self) -> AflResult<Range<f64>> {
            Ok(Range::new(10.0, 1000.0, 1.0))
        }
        fn exposure(&self) -> AflResult<f64> {
            Ok(*self.exposure.lock())
        }
        fn set_exposure(&self, v: f64) -> AflResult<()> {
            *self.exposure.lock() = v;
            Ok(())
        }
        fn gain_range(&self) -> AflResult<Range<f64>> {
            Ok(Range::new(1.0, 4.0, 0.1))
        }
        fn gain(&self) -> AflResult<f64> {
            Ok(*self.gain.lock())
        }
        fn set_gain(&self, v: f64) -> AflResult<()> {
            *self.gain.lock() = v;
            Ok(())
        }
    }

    const BOTH: Actuators = Actuators {
        exposure: true,
        gain: true,
    };
    const GOAL: BrightnessGoal = BrightnessGoal {
        target: 128.0,
        tolerance: 2.0,
    };

    #[test]
    fn test_within_tolerance_converges_without_writes() {
        let dev = Device::new(100.0, 1.0);
        let step = adjust(127.0, GOAL, BOTH, &dev, None).unwrap();
        assert!(step.converged);
        assert_eq!(*dev.exposure.lock(), 100.0);
    }

    #[test]
    fn test_brighten_uses_exposure_before_gain() {
        let dev = Device::new(100.0, 1.0);
        let step = adjust(64.0, GOAL, BOTH, &dev, None).unwrap();
        assert!(!step.converged);
        assert_eq!(*dev.exposure.lock(), 200.0);
        assert_eq!(*dev.gain.lock(), 1.0);

        let dev = Device::new(900.0, 1.0);
        adjust(64.0, GOAL, BOTH, &dev, None).unwrap();
        assert_eq!(*dev.exposure.lock(), 1000.0);
        assert!((*dev.gain.lock() - 1.8).abs() < 1e-9);
    }

    #[test]
    fn test_darken_uses_gain_before_exposure() {
        let dev = Device::new(100.0, 1.5);
        adjust(255.0, GOAL, BOTH, &dev, None).unwrap();
        assert_eq!(*dev.gain.lock(), 1.0);
        assert!(*dev.exposure.lock() < 100.0);
    }

    #[test]
    fn test_pinned_actuators_converge() {
        let dev = Device::new(1000.0, 4.0);
        let step = adjust(10.0, GOAL, BOTH, &dev, None).unwrap();
        assert!(step.converged);
    }

    #[test]
    fn test_host_gain_replaces_device_gain() {
        let dev = Device::new(1000.0, 1.0);
        let host = HostGain::new();
        let only_gain = Actuators {
            exposure: false,
            gain: true,
        };
        adjust(64.0, GOAL, only_gain, &dev, Some(&host)).unwrap();
        assert_eq!(*dev.gain.lock(), 1.0);
        assert_eq!(host.master_gain(), 2.0);
    }
}
