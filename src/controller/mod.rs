//! Auto-feature controllers.
//!
//! A [`Controller`] is a handle to one auto-feature unit (brightness, white
//! balance or autofocus) stored in the library arena. Handles are cheap to
//! clone; the controller lives as long as a manager owns it or any handle
//! refers to it. Once destroyed, every call through a remaining handle fails
//! with [`AflError::Error`] instead of touching freed state.
//!
//! # Example
//!
//! ```rust
//! use rust_afl::{Controller, ControllerType, Library, Mode};
//!
//! # fn main() -> Result<(), rust_afl::AflError> {
//! let library = Library::init();
//! let brightness = Controller::create(&library, ControllerType::Brightness)?;
//! if brightness.is_auto_target_supported()? {
//!     let range = brightness.auto_target_range()?;
//!     brightness.set_auto_target(range.max / 2)?;
//! }
//! brightness.set_mode(Mode::Once)?;
//! brightness.destroy()?;
//! # Ok(())
//! # }
//! ```

mod capabilities;
mod record;
mod state;

pub use capabilities::{Capabilities, Feature};
pub use record::{Callback, DataCallback};

pub(crate) use record::ControllerRecord;
pub(crate) use state::{ControllerState, EvalContext};

use crate::arena::Handle;
use crate::library::{Library, LibraryInner};
use afl_core::limits::{
    AUTO_PERCENTILE_RANGE, AUTO_TARGET_RANGE, AUTO_TOLERANCE_RANGE, DEFAULT_HYSTERESIS,
    DEFAULT_LIMIT, HYSTERESIS_RANGE, LIMIT_RANGE, MAX_WEIGHTED_ROIS, SKIP_FRAMES_RANGE,
    WEIGHTED_ROI_MIN_SIZE,
};
use afl_core::{
    AflError, AflResult, Algorithm, BrightnessComponent, ControllerType, Limit, Mode, Range,
    Rect, RoiCombination, RoiPreset, SharpnessAlgorithm, Size, Status, WeightedRoi,
};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Handle to one auto-feature controller.
pub struct Controller {
    library: Arc<LibraryInner>,
    handle: Handle,
    kind: ControllerType,
}

impl Controller {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a standalone controller, not owned by any manager.
    pub fn create(library: &Library, kind: ControllerType) -> AflResult<Controller> {
        let inner = &library.inner;
        inner.track(inner.ensure_initialized())?;
        let record = Arc::new(ControllerRecord::new(kind, None, 1));
        let handle = inner.controllers.write().insert(record);
        info!(controller = %kind, "controller created");
        Ok(Controller::from_parts(inner, handle, kind))
    }

    /// Handle for a freshly inserted record that already counts this reference.
    pub(crate) fn from_parts(
        library: &Arc<LibraryInner>,
        handle: Handle,
        kind: ControllerType,
    ) -> Controller {
        Controller {
            library: Arc::clone(library),
            handle,
            kind,
        }
    }

    /// New handle to a record. The caller holds the arena lock.
    pub(crate) fn attach(
        library: &Arc<LibraryInner>,
        handle: Handle,
        record: &ControllerRecord,
    ) -> Controller {
        record.acquire_external();
        Controller {
            library: Arc::clone(library),
            handle,
            kind: record.kind(),
        }
    }

    pub(crate) fn handle(&self) -> Handle {
        self.handle
    }

    pub(crate) fn belongs_to(&self, library: &Arc<LibraryInner>) -> bool {
        Arc::ptr_eq(&self.library, library)
    }

    /// Destroy a controller that no manager owns.
    ///
    /// Fails with `AccessDenied` while a manager owns it; remove it from the
    /// manager first or use `Manager::destroy_controller`.
    pub fn destroy(self) -> AflResult<()> {
        let result = self.destroy_record();
        self.library.track(result)
    }

    fn destroy_record(&self) -> AflResult<()> {
        self.library.ensure_initialized()?;
        let record = {
            let mut arena = self.library.controllers.write();
            let record = arena.get(self.handle).ok_or_else(stale)?;
            if record.owner().is_some() {
                return Err(AflError::AccessDenied(format!(
                    "{} controller is owned by a manager",
                    self.kind
                )));
            }
            arena.remove(self.handle).ok_or_else(stale)?
        };
        record.invalidate();
        info!(controller = %self.kind, "controller destroyed");
        Ok(())
    }

    /// Controller type.
    pub fn kind(&self) -> ControllerType {
        self.kind
    }

    /// Whether the controller has not been destroyed.
    pub fn is_valid(&self) -> bool {
        self.library.ensure_initialized().is_ok()
            && self.library.controllers.read().contains(self.handle)
    }

    fn record(&self) -> AflResult<Arc<ControllerRecord>> {
        self.library.ensure_initialized()?;
        self.library
            .controllers
            .read()
            .get(self.handle)
            .cloned()
            .ok_or_else(stale)
    }

    fn with_record<T>(&self, f: impl FnOnce(&ControllerRecord) -> AflResult<T>) -> AflResult<T> {
        let result = self.record().and_then(|record| f(&record));
        self.library.track(result)
    }

    /// Run `f` on the locked state once `feature` has been checked.
    fn access<T>(
        &self,
        feature: Feature,
        f: impl FnOnce(&mut ControllerState) -> AflResult<T>,
    ) -> AflResult<T> {
        self.with_record(|record| {
            record.capabilities.require(feature)?;
            f(&mut record.state.lock())
        })
    }

    fn query<T>(&self, feature: Feature, value: T) -> AflResult<T> {
        self.with_record(|record| {
            record.capabilities.require(feature)?;
            Ok(value)
        })
    }

    // =========================================================================
    // Capabilities
    // =========================================================================

    /// Feature set of this controller.
    pub fn capabilities(&self) -> AflResult<Capabilities> {
        self.with_record(|record| Ok(record.capabilities))
    }

    /// Whether a feature is available.
    pub fn is_supported(&self, feature: Feature) -> AflResult<bool> {
        self.with_record(|record| Ok(record.capabilities.supports(feature)))
    }

    /// Whether skip frames can be configured.
    pub fn is_skip_frames_supported(&self) -> AflResult<bool> {
        self.is_supported(Feature::SkipFrames)
    }

    /// Whether an evaluation ROI can be set.
    pub fn is_roi_supported(&self) -> AflResult<bool> {
        self.is_supported(Feature::Roi)
    }

    /// Whether weighted ROIs can be set.
    pub fn is_weighted_roi_supported(&self) -> AflResult<bool> {
        self.is_supported(Feature::WeightedRoi)
    }

    /// Whether ROI presets are accepted.
    pub fn is_roi_preset_supported(&self) -> AflResult<bool> {
        self.is_supported(Feature::RoiPreset)
    }

    /// Whether the global mode can be set.
    pub fn is_mode_supported(&self) -> AflResult<bool> {
        self.is_supported(Feature::Mode)
    }

    /// Whether exposure and gain can run on their own.
    pub fn is_brightness_component_mode_supported(&self) -> AflResult<bool> {
        self.is_supported(Feature::BrightnessComponentMode)
    }

    /// Whether the brightness target can be set.
    pub fn is_auto_target_supported(&self) -> AflResult<bool> {
        self.is_supported(Feature::AutoTarget)
    }

    /// Whether the brightness tolerance can be set.
    pub fn is_auto_tolerance_supported(&self) -> AflResult<bool> {
        self.is_supported(Feature::AutoTolerance)
    }

    /// Whether the brightness percentile can be set.
    pub fn is_auto_percentile_supported(&self) -> AflResult<bool> {
        self.is_supported(Feature::AutoPercentile)
    }

    /// Whether the focus search strategy can be chosen.
    pub fn is_algorithm_supported(&self) -> AflResult<bool> {
        self.is_supported(Feature::Algorithm)
    }

    /// Whether the sharpness metric can be chosen.
    pub fn is_sharpness_algorithm_supported(&self) -> AflResult<bool> {
        self.is_supported(Feature::SharpnessAlgorithm)
    }

    /// Whether the focus search limit can be set.
    pub fn is_limit_supported(&self) -> AflResult<bool> {
        self.is_supported(Feature::Limit)
    }

    /// Whether the continuous focus hysteresis can be set.
    pub fn is_hysteresis_supported(&self) -> AflResult<bool> {
        self.is_supported(Feature::Hysteresis)
    }

    // =========================================================================
    // Mode and status
    // =========================================================================

    /// Set the controller mode.
    ///
    /// Turning a running controller off cancels it. Activating a mode arms the
    /// controller; the next processed frame puts it in progress.
    pub fn set_mode(&self, mode: Mode) -> AflResult<()> {
        self.access(Feature::Mode, |state| {
            state.set_mode(mode);
            Ok(())
        })
    }

    /// Current mode. Reads `Off` after a `Once` run finished.
    pub fn mode(&self) -> AflResult<Mode> {
        self.access(Feature::Mode, |state| Ok(state.global.mode))
    }

    /// Current status.
    pub fn status(&self) -> AflResult<Status> {
        self.with_record(|record| Ok(record.state.lock().global.status))
    }

    /// Set the mode of one brightness component.
    pub fn set_brightness_component_mode(
        &self,
        component: BrightnessComponent,
        mode: Mode,
    ) -> AflResult<()> {
        self.access(Feature::BrightnessComponentMode, |state| {
            state.set_component_mode(component, mode);
            Ok(())
        })
    }

    /// Mode of one brightness component.
    pub fn brightness_component_mode(&self, component: BrightnessComponent) -> AflResult<Mode> {
        self.access(Feature::BrightnessComponentMode, |state| {
            Ok(state.components[component.slot()].mode)
        })
    }

    /// Status of one brightness component.
    pub fn brightness_component_status(
        &self,
        component: BrightnessComponent,
    ) -> AflResult<Status> {
        self.access(Feature::BrightnessComponentMode, |state| {
            Ok(state.components[component.slot()].status)
        })
    }

    // =========================================================================
    // Skip frames
    // =========================================================================

    /// Evaluate every `value`-th frame.
    pub fn set_skip_frames(&self, value: u32) -> AflResult<()> {
        self.access(Feature::SkipFrames, |state| {
            state.tunables.skip_frames = SKIP_FRAMES_RANGE.validate("skip frames", value)?;
            Ok(())
        })
    }

    /// Current skip frames value.
    pub fn skip_frames(&self) -> AflResult<u32> {
        self.access(Feature::SkipFrames, |state| Ok(state.tunables.skip_frames))
    }

    /// Accepted skip frames values.
    pub fn skip_frames_range(&self) -> AflResult<Range<u32>> {
        self.query(Feature::SkipFrames, SKIP_FRAMES_RANGE)
    }

    // =========================================================================
    // Regions of interest
    // =========================================================================

    /// Set the evaluation rectangle. The all-zero rectangle selects the full frame.
    pub fn set_roi(&self, roi: Rect) -> AflResult<()> {
        self.access(Feature::Roi, |state| {
            if !roi.is_full_frame() && (roi.width == 0 || roi.height == 0) {
                return Err(AflError::InvalidParameter(format!("empty ROI {roi}")));
            }
            state.tunables.roi = roi;
            state.tunables.roi_preset = None;
            Ok(())
        })
    }

    /// Current evaluation rectangle.
    pub fn roi(&self) -> AflResult<Rect> {
        self.access(Feature::Roi, |state| Ok(state.tunables.roi))
    }

    /// Place the ROI by preset. Resolved against every processed frame.
    pub fn set_roi_preset(&self, preset: RoiPreset) -> AflResult<()> {
        self.access(Feature::RoiPreset, |state| {
            state.tunables.roi_preset = Some(preset);
            Ok(())
        })
    }

    /// Active preset, `None` when an explicit ROI is in use.
    pub fn roi_preset(&self) -> AflResult<Option<RoiPreset>> {
        self.access(Feature::RoiPreset, |state| Ok(state.tunables.roi_preset))
    }

    /// Replace the whole weighted ROI list.
    pub fn set_weighted_rois(&self, rois: &[WeightedRoi]) -> AflResult<()> {
        self.access(Feature::WeightedRoi, |state| {
            if rois.len() > MAX_WEIGHTED_ROIS {
                return Err(AflError::InvalidParameter(format!(
                    "{} weighted ROIs exceed the maximum of {MAX_WEIGHTED_ROIS}",
                    rois.len()
                )));
            }
            let min = WEIGHTED_ROI_MIN_SIZE;
            if let Some(small) = rois
                .iter()
                .find(|w| w.roi.width < min.width || w.roi.height < min.height)
            {
                return Err(AflError::InvalidParameter(format!(
                    "weighted ROI {} is smaller than {}x{}",
                    small.roi, min.width, min.height
                )));
            }
            state.tunables.weighted_rois = rois.to_vec();
            Ok(())
        })
    }

    /// Replace the weighted ROI list with a single entry.
    pub fn set_weighted_roi(&self, roi: WeightedRoi) -> AflResult<()> {
        self.set_weighted_rois(&[roi])
    }

    /// Current weighted ROI list.
    pub fn weighted_rois(&self) -> AflResult<Vec<WeightedRoi>> {
        self.access(Feature::WeightedRoi, |state| {
            Ok(state.tunables.weighted_rois.clone())
        })
    }

    /// Copy the weighted ROI list into `buffer`, returning the number of entries.
    ///
    /// Fails with `BufferTooSmall` (carrying the required length) when the
    /// buffer cannot hold the list.
    pub fn weighted_rois_into(&self, buffer: &mut [WeightedRoi]) -> AflResult<usize> {
        self.access(Feature::WeightedRoi, |state| {
            let rois = &state.tunables.weighted_rois;
            if buffer.len() < rois.len() {
                return Err(AflError::BufferTooSmall {
                    required: rois.len(),
                    provided: buffer.len(),
                });
            }
            buffer[..rois.len()].copy_from_slice(rois);
            Ok(rois.len())
        })
    }

    /// Smallest accepted weighted ROI.
    pub fn weighted_roi_min_size(&self) -> AflResult<Size> {
        self.query(Feature::WeightedRoi, WEIGHTED_ROI_MIN_SIZE)
    }

    /// How overlapping weighted ROIs combine.
    pub fn set_roi_combination(&self, combination: RoiCombination) -> AflResult<()> {
        self.access(Feature::WeightedRoi, |state| {
            state.tunables.roi_combination = combination;
            Ok(())
        })
    }

    /// Current overlap policy.
    pub fn roi_combination(&self) -> AflResult<RoiCombination> {
        self.access(Feature::WeightedRoi, |state| {
            Ok(state.tunables.roi_combination)
        })
    }

    // =========================================================================
    // Brightness tunables
    // =========================================================================

    /// Set the brightness target on an 8-bit scale.
    pub fn set_auto_target(&self, value: u32) -> AflResult<()> {
        self.access(Feature::AutoTarget, |state| {
            state.tunables.auto_target = AUTO_TARGET_RANGE.validate("auto target", value)?;
            Ok(())
        })
    }

    /// Current brightness target.
    pub fn auto_target(&self) -> AflResult<u32> {
        self.access(Feature::AutoTarget, |state| Ok(state.tunables.auto_target))
    }

    /// Accepted brightness targets.
    pub fn auto_target_range(&self) -> AflResult<Range<u32>> {
        self.query(Feature::AutoTarget, AUTO_TARGET_RANGE)
    }

    /// Set the accepted deviation from the target.
    pub fn set_auto_tolerance(&self, value: u32) -> AflResult<()> {
        self.access(Feature::AutoTolerance, |state| {
            state.tunables.auto_tolerance =
                AUTO_TOLERANCE_RANGE.validate("auto tolerance", value)?;
            Ok(())
        })
    }

    /// Current brightness tolerance.
    pub fn auto_tolerance(&self) -> AflResult<u32> {
        self.access(Feature::AutoTolerance, |state| {
            Ok(state.tunables.auto_tolerance)
        })
    }

    /// Accepted brightness tolerances.
    pub fn auto_tolerance_range(&self) -> AflResult<Range<u32>> {
        self.query(Feature::AutoTolerance, AUTO_TOLERANCE_RANGE)
    }

    /// Measure only the darkest `value` percent of pixels.
    pub fn set_auto_percentile(&self, value: f64) -> AflResult<()> {
        self.access(Feature::AutoPercentile, |state| {
            state.tunables.auto_percentile =
                AUTO_PERCENTILE_RANGE.validate("auto percentile", value)?;
            Ok(())
        })
    }

    /// Current brightness percentile.
    pub fn auto_percentile(&self) -> AflResult<f64> {
        self.access(Feature::AutoPercentile, |state| {
            Ok(state.tunables.auto_percentile)
        })
    }

    /// Accepted brightness percentiles.
    pub fn auto_percentile_range(&self) -> AflResult<Range<f64>> {
        self.query(Feature::AutoPercentile, AUTO_PERCENTILE_RANGE)
    }

    /// Statistic of the last evaluated frame (luma on an 8-bit scale).
    pub fn last_auto_average(&self) -> AflResult<f64> {
        self.access(Feature::AutoAverage, |state| Ok(state.last_average))
    }

    /// Red, green and blue means of the last evaluated frame.
    pub fn last_auto_averages(&self) -> AflResult<[f64; 3]> {
        self.access(Feature::AutoAverage, |state| Ok(state.last_averages))
    }

    // =========================================================================
    // Autofocus tunables
    // =========================================================================

    /// Choose the focus search strategy.
    pub fn set_algorithm(&self, algorithm: Algorithm) -> AflResult<()> {
        self.access(Feature::Algorithm, |state| {
            state.tunables.algorithm = algorithm;
            Ok(())
        })
    }

    /// Current focus search strategy.
    pub fn algorithm(&self) -> AflResult<Algorithm> {
        self.access(Feature::Algorithm, |state| Ok(state.tunables.algorithm))
    }

    /// Every supported focus search strategy.
    pub fn algorithm_list(&self) -> AflResult<Vec<Algorithm>> {
        self.query(Feature::Algorithm, Algorithm::ALL.to_vec())
    }

    /// Choose the sharpness metric.
    pub fn set_sharpness_algorithm(&self, algorithm: SharpnessAlgorithm) -> AflResult<()> {
        self.access(Feature::SharpnessAlgorithm, |state| {
            state.tunables.sharpness_algorithm = algorithm;
            Ok(())
        })
    }

    /// Current sharpness metric.
    pub fn sharpness_algorithm(&self) -> AflResult<SharpnessAlgorithm> {
        self.access(Feature::SharpnessAlgorithm, |state| {
            Ok(state.tunables.sharpness_algorithm)
        })
    }

    /// Every supported sharpness metric.
    pub fn sharpness_algorithm_list(&self) -> AflResult<Vec<SharpnessAlgorithm>> {
        self.query(Feature::SharpnessAlgorithm, SharpnessAlgorithm::ALL.to_vec())
    }

    /// Bound the focus search. Intersected with the device range at evaluation.
    pub fn set_limit(&self, limit: Limit) -> AflResult<()> {
        self.access(Feature::Limit, |state| {
            limit.validate()?;
            LIMIT_RANGE.validate("limit min", limit.min)?;
            LIMIT_RANGE.validate("limit max", limit.max)?;
            state.tunables.limit = limit;
            Ok(())
        })
    }

    /// Current focus search limit.
    pub fn limit(&self) -> AflResult<Limit> {
        self.access(Feature::Limit, |state| Ok(state.tunables.limit))
    }

    /// Accepted values for either end of the limit.
    pub fn limit_range(&self) -> AflResult<Range<i32>> {
        self.query(Feature::Limit, LIMIT_RANGE)
    }

    /// Factory default limit, independent of the current configuration.
    pub fn default_limit(&self) -> AflResult<Limit> {
        self.query(Feature::Limit, DEFAULT_LIMIT)
    }

    /// Set the sharpness drop in percent that restarts a continuous search.
    pub fn set_hysteresis(&self, value: u8) -> AflResult<()> {
        self.access(Feature::Hysteresis, |state| {
            state.tunables.hysteresis = HYSTERESIS_RANGE.validate("hysteresis", value)?;
            Ok(())
        })
    }

    /// Current hysteresis.
    pub fn hysteresis(&self) -> AflResult<u8> {
        self.access(Feature::Hysteresis, |state| Ok(state.tunables.hysteresis))
    }

    /// Accepted hysteresis values.
    pub fn hysteresis_range(&self) -> AflResult<Range<u8>> {
        self.query(Feature::Hysteresis, HYSTERESIS_RANGE)
    }

    /// Factory default hysteresis, independent of the current configuration.
    pub fn default_hysteresis(&self) -> AflResult<u8> {
        self.query(Feature::Hysteresis, DEFAULT_HYSTERESIS)
    }

    // =========================================================================
    // Callbacks
    // =========================================================================
    //
    // Callbacks run on the thread calling `Manager::process`, after the
    // controller's state lock is released. Registering replaces any previous
    // callback of the same kind; unregistering when none is set does nothing.
    // Destroying the controller drops them.

    /// Called when a `Once` run finishes.
    pub fn register_finished_callback<F>(&self, callback: F) -> AflResult<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.with_record(|record| {
            record.callbacks.lock().finished = Some(Arc::new(callback));
            Ok(())
        })
    }

    /// Remove the finished callback.
    pub fn unregister_finished_callback(&self) -> AflResult<()> {
        self.with_record(|record| {
            record.callbacks.lock().finished = None;
            Ok(())
        })
    }

    /// Called with (focus position, sharpness) for every autofocus sample.
    pub fn register_data_processing_callback<F>(&self, callback: F) -> AflResult<()>
    where
        F: Fn(i32, i32) + Send + Sync + 'static,
    {
        self.with_record(|record| {
            record.capabilities.require(Feature::DataProcessing)?;
            record.callbacks.lock().data = Some(Arc::new(callback));
            Ok(())
        })
    }

    /// Remove the data processing callback.
    pub fn unregister_data_processing_callback(&self) -> AflResult<()> {
        self.with_record(|record| {
            record.capabilities.require(Feature::DataProcessing)?;
            record.callbacks.lock().data = None;
            Ok(())
        })
    }

    /// Called when a brightness component's `Once` run finishes.
    pub fn register_component_callback<F>(
        &self,
        component: BrightnessComponent,
        callback: F,
    ) -> AflResult<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.with_record(|record| {
            record
                .capabilities
                .require(Feature::BrightnessComponentMode)?;
            record.callbacks.lock().components[component.slot()] = Some(Arc::new(callback));
            Ok(())
        })
    }

    /// Remove a brightness component callback.
    pub fn unregister_component_callback(&self, component: BrightnessComponent) -> AflResult<()> {
        self.with_record(|record| {
            record
                .capabilities
                .require(Feature::BrightnessComponentMode)?;
            record.callbacks.lock().components[component.slot()] = None;
            Ok(())
        })
    }
}

fn stale() -> AflError {
    AflError::Error("controller has been destroyed".to_string())
}

impl Clone for Controller {
    fn clone(&self) -> Self {
        if let Some(record) = self.library.controllers.read().get(self.handle) {
            record.acquire_external();
        }
        Controller {
            library: Arc::clone(&self.library),
            handle: self.handle,
            kind: self.kind,
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.library.release_external(self.handle);
    }
}

impl PartialEq for Controller {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle && Arc::ptr_eq(&self.library, &other.library)
    }
}

impl Eq for Controller {}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .finish()
    }
}
