//! Autofocus engine: drives a [`FocusSearch`] one frame at a time and
//! watches sharpness afterwards to re-trigger in continuous mode.

use super::search::{search_for, FocusSearch, SearchStep};
use super::sharpness::sharpness;
use super::statistics::WeightMap;
use crate::device::DeviceControl;
use afl_core::{AflError, AflResult, Algorithm, Image, Limit, SharpnessAlgorithm};
use tracing::debug;

/// Autofocus tunables in effect for one step.
#[derive(Debug, Clone, Copy)]
pub struct FocusConfig {
    /// Search strategy.
    pub algorithm: Algorithm,
    /// Sharpness metric.
    pub sharpness: SharpnessAlgorithm,
    /// Search bounds before intersecting with the device range.
    pub limit: Limit,
    /// Percentage sharpness drop tolerated before searching again.
    pub hysteresis: u8,
}

/// Outcome of one autofocus step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusOutcome {
    /// A search is running.
    Searching,
    /// The search just ended on the best position.
    Converged,
    /// Focus is held and sharpness stays within the hysteresis band.
    Holding,
}

/// One sharpness sample: focus position and rounded score.
pub type FocusSample = (i32, i32);

#[derive(Debug, Default)]
enum Phase {
    #[default]
    Idle,
    Searching(Box<dyn FocusSearch>),
    Monitoring {
        reference: Option<f64>,
    },
}

/// Per-controller autofocus progress.
#[derive(Debug, Default)]
pub struct FocusEngine {
    phase: Phase,
}

impl FocusEngine {
    /// Forget any running search.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Whether a finished search is holding its position.
    pub fn is_holding(&self) -> bool {
        matches!(self.phase, Phase::Monitoring { .. })
    }

    fn measure(
        config: &FocusConfig,
        image: &Image,
        weights: &WeightMap,
        device: &dyn DeviceControl,
        samples: &mut Vec<FocusSample>,
    ) -> AflResult<(i32, f64)> {
        let position = device.focus()?;
        let score = sharpness(config.sharpness, image, weights);
        samples.push((position, score.round() as i32));
        Ok((position, score))
    }

    fn begin(&mut self, config: &FocusConfig, device: &dyn DeviceControl) -> AflResult<FocusOutcome> {
        let device_range = device.focus_range()?;
        let limit = config.limit.intersect(&device_range).ok_or_else(|| {
            AflError::InvalidParameter(format!(
                "focus limit [{}, {}] does not overlap device range [{}, {}]",
                config.limit.min, config.limit.max, device_range.min, device_range.max
            ))
        })?;
        let mut search = search_for(config.algorithm);
        let first = search.start(limit, device.focus()?);
        debug!(algorithm = ?config.algorithm, ?limit, first, "focus search started");
        device.set_focus(first)?;
        self.phase = Phase::Searching(search);
        Ok(FocusOutcome::Searching)
    }

    /// Run one step on a frame taken at the device's current focus position.
    pub fn step(
        &mut self,
        config: &FocusConfig,
        image: &Image,
        weights: &WeightMap,
        device: &dyn DeviceControl,
        samples: &mut Vec<FocusSample>,
    ) -> AflResult<FocusOutcome> {
        match &mut self.phase {
            Phase::Idle => self.begin(config, device),
            Phase::Searching(search) => {
                let (position, score) = Self::measure(config, image, weights, device, samples)?;
                match search.advance(position, score) {
                    SearchStep::MoveTo(next) => {
                        device.set_focus(next)?;
                        Ok(FocusOutcome::Searching)
                    }
                    SearchStep::Converged(best) => {
                        device.set_focus(best)?;
                        debug!(position = best, "focus search converged");
                        self.phase = Phase::Monitoring { reference: None };
                        Ok(FocusOutcome::Converged)
                    }
                }
            }
            Phase::Monitoring { reference } => {
                let (_, score) = Self::measure(config, image, weights, device, samples)?;
                let Some(best) = *reference else {
                    *reference = Some(score);
                    return Ok(FocusOutcome::Holding);
                };
                let threshold = best * (1.0 - f64::from(config.hysteresis) / 100.0);
                if score < threshold {
                    debug!(score, threshold, "sharpness dropped, restarting focus search");
                    return self.begin(config, device);
                }
                *reference = Some(best.max(score));
                Ok(FocusOutcome::Holding)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use afl_core::RoiCombination;
    use parking_lot::Mutex;

    const RANGE: Limit = Limit { min: 0, max: 1023 };

    /// Focus stepper in front of a striped scene whose sharpest position can move.
    struct Lens {
        position: Mutex<i32>,
        peak: Mutex<i32>,
    }

    impl Lens {
        fn new(position: i32, peak: i32) -> Self {
            Self {
                position: Mutex::new(position),
                peak: Mutex::new(peak),
            }
        }

        fn move_peak(&self, peak: i32) {
            *self.peak.lock() = peak;
        }

        fn frame(&self) -> Image {
            let d = f64::from(*self.position.lock() - *self.peak.lock()) / 50.0;
            let amplitude = 100.0 / (1.0 + d * d);
            let data = (0..32u32)
                .flat_map(|_| {
                    (0..32u32).map(move |x| {
                        let sign = if (x / 2) % 2 == 0 { 1.0 } else { -1.0 };
                        (128.0 + amplitude * sign).round() as u8
                    })
                })
                .collect();
            Image::from_mono8(32, 32, data)
        }
    }

    impl DeviceControl for Lens {
        fn focus_range(&self) -> AflResult<Limit> {
            Ok(RANGE)
        }

        fn focus(&self) -> AflResult<i32> {
            Ok(*self.position.lock())
        }

        fn set_focus(&self, position: i32) -> AflResult<()> {
            *self.position.lock() = RANGE.clamp(position);
            Ok(())
        }
    }

    fn config(hysteresis: u8) -> FocusConfig {
        FocusConfig {
            algorithm: Algorithm::GoldenRatioSearch,
            sharpness: SharpnessAlgorithm::Tenengrad,
            limit: RANGE,
            hysteresis,
        }
    }

    fn step(engine: &mut FocusEngine, config: &FocusConfig, lens: &Lens) -> FocusOutcome {
        let weights = WeightMap::new(32, 32, &[], RoiCombination::Additive);
        let mut samples = Vec::new();
        engine
            .step(config, &lens.frame(), &weights, lens, &mut samples)
            .unwrap()
    }

    fn converge(engine: &mut FocusEngine, config: &FocusConfig, lens: &Lens) {
        for _ in 0..100 {
            if step(engine, config, lens) == FocusOutcome::Converged {
                return;
            }
        }
        panic!("focus search did not converge");
    }

    #[test]
    fn test_first_step_only_positions_the_lens() {
        let lens = Lens::new(0, 600);
        let mut engine = FocusEngine::default();
        let weights = WeightMap::new(32, 32, &[], RoiCombination::Additive);
        let mut samples = Vec::new();

        let outcome = engine
            .step(&config(10), &lens.frame(), &weights, &lens, &mut samples)
            .unwrap();
        assert_eq!(outcome, FocusOutcome::Searching);
        assert!(samples.is_empty());
        assert_ne!(lens.focus().unwrap(), 0);
    }

    #[test]
    fn test_converged_search_holds_position() {
        let lens = Lens::new(0, 600);
        let mut engine = FocusEngine::default();
        let config = config(10);

        converge(&mut engine, &config, &lens);
        let settled = lens.focus().unwrap();
        assert!((settled - 600).abs() <= 20, "settled at {settled}");
        assert!(engine.is_holding());

        for _ in 0..5 {
            assert_eq!(step(&mut engine, &config, &lens), FocusOutcome::Holding);
        }
        assert_eq!(lens.focus().unwrap(), settled);

        engine.reset();
        assert!(!engine.is_holding());
    }

    #[test]
    fn test_small_sharpness_drop_stays_within_hysteresis() {
        let lens = Lens::new(0, 600);
        let mut engine = FocusEngine::default();
        let config = config(50);

        converge(&mut engine, &config, &lens);
        let settled = lens.focus().unwrap();
        assert_eq!(step(&mut engine, &config, &lens), FocusOutcome::Holding);

        lens.move_peak(settled + 10);
        assert_eq!(step(&mut engine, &config, &lens), FocusOutcome::Holding);
        assert_eq!(lens.focus().unwrap(), settled);
    }

    #[test]
    fn test_sharpness_drop_restarts_search() {
        let lens = Lens::new(0, 600);
        let mut engine = FocusEngine::default();
        let config = config(10);

        converge(&mut engine, &config, &lens);
        assert_eq!(step(&mut engine, &config, &lens), FocusOutcome::Holding);

        lens.move_peak(200);
        let weights = WeightMap::new(32, 32, &[], RoiCombination::Additive);
        let mut samples = Vec::new();
        let outcome = engine
            .step(&config, &lens.frame(), &weights, &lens, &mut samples)
            .unwrap();
        assert_eq!(outcome, FocusOutcome::Searching);
        // The frame that revealed the drop is still reported.
        assert_eq!(samples.len(), 1);
        assert!(!engine.is_holding());

        converge(&mut engine, &config, &lens);
        let settled = lens.focus().unwrap();
        assert!((settled - 200).abs() <= 20, "settled at {settled}");
    }

    #[test]
    fn test_limit_outside_device_range_is_rejected() {
        let lens = Lens::new(0, 600);
        let mut engine = FocusEngine::default();
        let config = FocusConfig {
            limit: Limit {
                min: 2_000,
                max: 3_000,
            },
            ..config(10)
        };
        let weights = WeightMap::new(32, 32, &[], RoiCombination::Additive);
        let mut samples = Vec::new();
        let result = engine.step(&config, &lens.frame(), &weights, &lens, &mut samples);
        assert!(matches!(result, Err(AflError::InvalidParameter(_))));
    }
}
