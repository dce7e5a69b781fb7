//! Grey-world white balance.

use crate::device::GainActuator;
use afl_core::{AflError, AflResult};

/// Largest channel deviation from green (8-bit scale) still considered balanced.
pub const BALANCE_TOLERANCE: f64 = 2.0;

/// Result of one white balance step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceStep {
    /// Channels are balanced.
    pub converged: bool,
    /// Red, green and blue gains after the step.
    pub gains: [f64; 3],
}

/// Move the red and blue gains so their channel means match green.
///
/// `means` are the red, green and blue means measured on a frame that
/// already carries the actuator's current gains.
pub fn adjust(means: [f64; 3], actuator: Option<&dyn GainActuator>) -> AflResult<BalanceStep> {
    let actuator = actuator.ok_or_else(|| {
        AflError::NotSupported("white balance needs a host gain actuator".to_string())
    })?;
    let gains = actuator.color_gains();
    let [r, g, b] = means;
    if (r - g).abs() <= BALANCE_TOLERANCE && (b - g).abs() <= BALANCE_TOLERANCE {
        return Ok(BalanceStep {
            converged: true,
            gains,
        });
    }
    if g < 1.0 {
        return Err(AflError::Error(
            "green channel is empty, white balance cannot be estimated".to_string(),
        ));
    }

    let range = actuator.color_gain_range();
    let correct = |gain: f64, mean: f64| range.clamp(gain * g / mean.max(1.0));
    let next = [correct(gains[0], r), gains[1], correct(gains[2], b)];
    if next == gains {
        return Ok(BalanceStep {
            converged: true,
            gains,
        });
    }
    actuator.set_color_gains(next)?;
    Ok(BalanceStep {
        converged: false,
        gains: next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HostGain;

    #[test]
    fn test_requires_actuator() {
        assert!(matches!(
            adjust([10.0, 20.0, 30.0], None),
            Err(AflError::NotSupported(_))
        ));
    }

    #[test]
    fn test_balances_towards_green() {
        let host = HostGain::new();
        let step = adjust([150.0, 100.0, 50.0], Some(&host)).unwrap();
        assert!(!step.converged);
        let gains = host.color_gains();
        assert!((gains[0] - 100.0 / 150.0).abs() < 1e-9);
        assert_eq!(gains[1], 1.0);
        assert_eq!(gains[2], 2.0);

        let step = adjust([101.0, 100.0, 99.0], Some(&host)).unwrap();
        assert!(step.converged);
    }
}
