//! Per-controller configuration and the Mode/Status state machine.

use crate::algorithm::focus::{FocusConfig, FocusEngine, FocusOutcome};
use crate::algorithm::statistics::{luma_statistic, resolve_roi, rgb_means, WeightMap};
use crate::algorithm::{brightness, white_balance};
use crate::device::{DeviceControl, GainActuator};
use afl_core::limits::{
    DEFAULT_AUTO_PERCENTILE, DEFAULT_AUTO_TARGET, DEFAULT_AUTO_TOLERANCE, DEFAULT_HYSTERESIS,
    DEFAULT_LIMIT, DEFAULT_SKIP_FRAMES,
};
use afl_core::{
    AflError, AflResult, Algorithm, BrightnessComponent, ControllerType, Image, Limit, Mode,
    Rect, RoiCombination, RoiPreset, SharpnessAlgorithm, Status, WeightedRoi,
};
use tracing::debug;

/// Everything an evaluation needs besides the controller itself.
pub(crate) struct EvalContext<'a> {
    pub image: &'a Image,
    pub device: &'a dyn DeviceControl,
    pub host_gain: Option<&'a dyn GainActuator>,
}

/// Callback to run once the state lock has been released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Finished,
    ComponentFinished(BrightnessComponent),
    Data(i32, i32),
}

/// Mode and status of the controller or of one brightness component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct UnitState {
    pub mode: Mode,
    pub status: Status,
}

impl UnitState {
    fn set_mode(&mut self, mode: Mode) {
        self.status = match (self.status, mode) {
            (Status::InProgress, Mode::Off) => Status::Canceled,
            (Status::InProgress, _) => Status::InProgress,
            _ => Status::Off,
        };
        self.mode = mode;
    }

    fn runnable(&self) -> bool {
        self.mode.is_active() && self.status != Status::Error
    }

    /// Returns true when a `Once` run just finished.
    fn settle(&mut self, converged: bool) -> bool {
        if converged && self.mode == Mode::Once {
            self.status = Status::Finished;
            self.mode = Mode::Off;
            return true;
        }
        false
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Tunables {
    pub skip_frames: u32,
    pub roi: Rect,
    pub roi_preset: Option<RoiPreset>,
    pub weighted_rois: Vec<WeightedRoi>,
    pub roi_combination: RoiCombination,
    pub auto_target: u32,
    pub auto_tolerance: u32,
    pub auto_percentile: f64,
    pub algorithm: Algorithm,
    pub sharpness_algorithm: SharpnessAlgorithm,
    pub limit: Limit,
    pub hysteresis: u8,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            skip_frames: DEFAULT_SKIP_FRAMES,
            roi: Rect::default(),
            roi_preset: None,
            weighted_rois: Vec::new(),
            roi_combination: RoiCombination::default(),
            auto_target: DEFAULT_AUTO_TARGET,
            auto_tolerance: DEFAULT_AUTO_TOLERANCE,
            auto_percentile: DEFAULT_AUTO_PERCENTILE,
            algorithm: Algorithm::default(),
            sharpness_algorithm: SharpnessAlgorithm::default(),
            limit: DEFAULT_LIMIT,
            hysteresis: DEFAULT_HYSTERESIS,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ControllerState {
    kind: ControllerType,
    pub global: UnitState,
    pub components: [UnitState; 2],
    pub tunables: Tunables,
    pub last_average: f64,
    pub last_averages: [f64; 3],
    frame_counter: u64,
    focus: FocusEngine,
}

impl ControllerState {
    pub fn new(kind: ControllerType) -> Self {
        Self {
            kind,
            global: UnitState::default(),
            components: [UnitState::default(); 2],
            tunables: Tunables::default(),
            last_average: 0.0,
            last_averages: [0.0; 3],
            frame_counter: 0,
            focus: FocusEngine::default(),
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.global.set_mode(mode);
        // Once must end on a search of its own, not on a held position.
        if mode == Mode::Once && self.focus.is_holding() {
            self.focus.reset();
        }
        self.after_mode_change();
        debug!(controller = %self.kind, ?mode, status = ?self.global.status, "mode set");
    }

    pub fn set_component_mode(&mut self, component: BrightnessComponent, mode: Mode) {
        let unit = &mut self.components[component.slot()];
        unit.set_mode(mode);
        let status = unit.status;
        self.after_mode_change();
        debug!(controller = %self.kind, %component, ?mode, ?status, "component mode set");
    }

    fn after_mode_change(&mut self) {
        self.frame_counter = 0;
        if !self.any_in_progress() {
            self.focus.reset();
        }
    }

    fn any_in_progress(&self) -> bool {
        std::iter::once(&self.global)
            .chain(self.components.iter())
            .any(|u| u.status == Status::InProgress)
    }

    fn component_runnable(&self, component: BrightnessComponent) -> bool {
        self.kind == ControllerType::Brightness && self.components[component.slot()].runnable()
    }

    fn runnable_units(&mut self) -> impl Iterator<Item = &mut UnitState> + '_ {
        let brightness = self.kind == ControllerType::Brightness;
        std::iter::once(&mut self.global)
            .chain(self.components.iter_mut().filter(move |_| brightness))
            .filter(|u| u.runnable())
    }

    /// Reject an overlapping evaluation.
    pub fn mark_busy(&mut self) {
        for unit in self.runnable_units() {
            if unit.status != Status::Finished {
                unit.status = Status::Busy;
            }
        }
    }

    /// Clear everything when the controller is invalidated.
    pub fn shut_down(&mut self) {
        self.global.mode = Mode::Off;
        for unit in &mut self.components {
            unit.mode = Mode::Off;
        }
        self.focus.reset();
    }

    /// Evaluate one frame. Events are returned even when the evaluation fails.
    pub fn evaluate(&mut self, ctx: &EvalContext<'_>) -> (Vec<Event>, AflResult<()>) {
        let mut events = Vec::new();
        let result = self.evaluate_into(ctx, &mut events);
        (events, result)
    }

    fn evaluate_into(&mut self, ctx: &EvalContext<'_>, events: &mut Vec<Event>) -> AflResult<()> {
        if self.runnable_units().next().is_none() {
            return Ok(());
        }
        let frame = self.frame_counter;
        self.frame_counter += 1;
        if frame % u64::from(self.tunables.skip_frames.max(1)) != 0 {
            return Ok(());
        }
        for unit in self.runnable_units() {
            unit.status = Status::InProgress;
        }

        let converged = match self.kind {
            ControllerType::Brightness => self.step_brightness(ctx),
            ControllerType::WhiteBalance => self.step_white_balance(ctx),
            ControllerType::Autofocus => self.step_focus(ctx, events),
        };
        let converged = match converged {
            Ok(converged) => converged,
            Err(e) => {
                for unit in self.runnable_units() {
                    unit.status = Status::Error;
                }
                self.focus.reset();
                return Err(e);
            }
        };

        let brightness = self.kind == ControllerType::Brightness;
        if self.global.runnable() && self.global.settle(converged) {
            self.focus.reset();
            events.push(Event::Finished);
        }
        if brightness {
            for component in BrightnessComponent::ALL {
                let unit = &mut self.components[component.slot()];
                if unit.runnable() && unit.settle(converged) {
                    events.push(Event::ComponentFinished(component));
                }
            }
        }
        Ok(())
    }

    fn step_brightness(&mut self, ctx: &EvalContext<'_>) -> AflResult<bool> {
        let t = &self.tunables;
        let rect = resolve_roi(t.roi, t.roi_preset, ctx.image)?;
        let statistic = luma_statistic(ctx.image, rect, t.auto_percentile);
        self.last_average = statistic;
        self.last_averages = rgb_means(ctx.image, rect);

        let global = self.global.runnable();
        let actuators = brightness::Actuators {
            exposure: global || self.component_runnable(BrightnessComponent::Exposure),
            gain: global || self.component_runnable(BrightnessComponent::Gain),
        };
        let goal = brightness::BrightnessGoal {
            target: f64::from(t.auto_target),
            tolerance: f64::from(t.auto_tolerance),
        };
        let step = brightness::adjust(statistic, goal, actuators, ctx.device, ctx.host_gain)?;
        debug!(statistic, ?step, "brightness step");
        Ok(step.converged)
    }

    fn step_white_balance(&mut self, ctx: &EvalContext<'_>) -> AflResult<bool> {
        if !ctx.image.is_color() {
            return Err(AflError::InvalidImageFormat(format!(
                "white balance needs a colour image, got {:?}",
                ctx.image.format
            )));
        }
        let t = &self.tunables;
        let rect = resolve_roi(t.roi, t.roi_preset, ctx.image)?;
        let means = rgb_means(ctx.image, rect);
        self.last_averages = means;
        self.last_average = 0.299 * means[0] + 0.587 * means[1] + 0.114 * means[2];
        let step = white_balance::adjust(means, ctx.host_gain)?;
        debug!(?means, ?step, "white balance step");
        Ok(step.converged)
    }

    fn step_focus(&mut self, ctx: &EvalContext<'_>, events: &mut Vec<Event>) -> AflResult<bool> {
        let t = &self.tunables;
        let config = FocusConfig {
            algorithm: t.algorithm,
            sharpness: t.sharpness_algorithm,
            limit: t.limit,
            hysteresis: t.hysteresis,
        };
        let weights = WeightMap::new(
            ctx.image.width,
            ctx.image.height,
            &t.weighted_rois,
            t.roi_combination,
        );
        let mut samples = Vec::new();
        let outcome = self
            .focus
            .step(&config, ctx.image, &weights, ctx.device, &mut samples);
        events.extend(samples.into_iter().map(|(pos, score)| Event::Data(pos, score)));
        Ok(outcome? == FocusOutcome::Converged)
    }
}
