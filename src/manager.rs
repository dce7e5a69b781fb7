//! Auto-feature manager.
//!
//! A [`Manager`] owns at most one controller per type and runs them against
//! every frame handed to [`Manager::process`]. The controller list is guarded
//! by a single mutex; frame processing is serialized with a running flag and
//! an overlapping call is rejected with `Busy` instead of queued.
//!
//! # Example
//!
//! ```rust
//! use rust_afl::device::NoDevice;
//! use rust_afl::{ControllerType, Image, Library, Manager, Mode};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), rust_afl::AflError> {
//! let library = Library::init();
//! let manager = Manager::new(&library, Arc::new(NoDevice))?;
//! let wb = manager.create_controller(ControllerType::WhiteBalance)?;
//! wb.set_mode(Mode::Off)?;
//!
//! let frame = Image::from_rgb8(64, 64, vec![128; 64 * 64 * 3]);
//! if !manager.status() {
//!     manager.process(&frame)?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::arena::Handle;
use crate::controller::{Controller, ControllerRecord, EvalContext};
use crate::device::{DeviceControl, GainActuator};
use crate::library::{Library, LibraryInner, ManagerId};
use afl_core::{AflError, AflResult, ControllerType, Image};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Clears the running flag when processing ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owner of a set of controllers, at most one per type.
pub struct Manager {
    id: ManagerId,
    library: Arc<LibraryInner>,
    device: Arc<dyn DeviceControl>,
    host_gain: RwLock<Option<Arc<dyn GainActuator>>>,
    controllers: Mutex<Vec<(ControllerType, Handle)>>,
    running: AtomicBool,
    frames_processed: AtomicU64,
}

impl Manager {
    /// Create an empty manager writing to `device`.
    pub fn new(library: &Library, device: Arc<dyn DeviceControl>) -> AflResult<Self> {
        let inner = &library.inner;
        inner.track(inner.ensure_initialized())?;
        let id = inner.next_manager_id();
        info!(manager = id.0, "manager created");
        Ok(Self {
            id,
            library: Arc::clone(inner),
            device,
            host_gain: RwLock::new(None),
            controllers: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            frames_processed: AtomicU64::new(0),
        })
    }

    /// Create a manager plus one controller for each listed type.
    pub fn with_controllers(
        library: &Library,
        device: Arc<dyn DeviceControl>,
        types: &[ControllerType],
    ) -> AflResult<Self> {
        let manager = Self::new(library, device)?;
        for &kind in types {
            manager.create_controller(kind)?;
        }
        Ok(manager)
    }

    fn track<T>(&self, result: AflResult<T>) -> AflResult<T> {
        self.library.track(result)
    }

    fn check_device(&self, kind: ControllerType) -> AflResult<()> {
        if kind == ControllerType::Autofocus && self.device.focus_range().is_err() {
            return Err(AflError::NotSupported(
                "autofocus needs a device with a focus actuator".to_string(),
            ));
        }
        Ok(())
    }

    fn check_library(&self, controller: &Controller) -> AflResult<()> {
        self.library.ensure_initialized()?;
        if !controller.belongs_to(&self.library) {
            return Err(AflError::InvalidParameter(
                "controller belongs to a different library".to_string(),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Controller membership
    // =========================================================================

    /// Take shared ownership of a controller.
    ///
    /// Adding a controller this manager already owns does nothing. Fails with
    /// `InvalidParameter` when another controller of the same type is owned
    /// and with `AccessDenied` when a different manager owns it.
    pub fn add_controller(&self, controller: &Controller) -> AflResult<()> {
        let result = self.add_inner(controller);
        self.track(result)
    }

    fn add_inner(&self, controller: &Controller) -> AflResult<()> {
        self.check_library(controller)?;
        let mut list = self.controllers.lock();
        let arena = self.library.controllers.read();
        let record = arena.get(controller.handle()).ok_or_else(stale)?;
        if record.owner() == Some(self.id) {
            return Ok(());
        }
        let kind = record.kind();
        if list.iter().any(|(k, _)| *k == kind) {
            return Err(AflError::InvalidParameter(format!(
                "manager already holds a {kind} controller"
            )));
        }
        self.check_device(kind)?;
        record.claim(self.id)?;
        list.push((kind, controller.handle()));
        info!(manager = self.id.0, controller = %kind, "controller added");
        Ok(())
    }

    /// Detach a controller without destroying it.
    ///
    /// A controller this manager does not own is left alone. Fails with
    /// `Error` when the controller has been destroyed.
    pub fn remove_controller(&self, controller: &Controller) -> AflResult<()> {
        let result = self.remove_inner(controller);
        self.track(result)
    }

    fn remove_inner(&self, controller: &Controller) -> AflResult<()> {
        self.check_library(controller)?;
        let mut list = self.controllers.lock();
        let arena = self.library.controllers.read();
        let record = arena.get(controller.handle()).ok_or_else(stale)?;
        if record.owner() != Some(self.id) {
            debug!(manager = self.id.0, controller = %record.kind(), "remove of unowned controller ignored");
            return Ok(());
        }
        // The caller's handle keeps the record referenced.
        record.disown(self.id);
        list.retain(|(_, h)| *h != controller.handle());
        info!(manager = self.id.0, controller = %record.kind(), "controller removed");
        Ok(())
    }

    /// Create a controller of `kind` owned by this manager.
    pub fn create_controller(&self, kind: ControllerType) -> AflResult<Controller> {
        let result = self.create_inner(kind);
        self.track(result)
    }

    fn create_inner(&self, kind: ControllerType) -> AflResult<Controller> {
        self.library.ensure_initialized()?;
        let mut list = self.controllers.lock();
        if list.iter().any(|(k, _)| *k == kind) {
            return Err(AflError::InvalidParameter(format!(
                "manager already holds a {kind} controller"
            )));
        }
        self.check_device(kind)?;
        let record = Arc::new(ControllerRecord::new(kind, Some(self.id), 1));
        let handle = self.library.controllers.write().insert(record);
        list.push((kind, handle));
        info!(manager = self.id.0, controller = %kind, "controller created");
        Ok(Controller::from_parts(&self.library, handle, kind))
    }

    /// Remove and invalidate one owned controller.
    pub fn destroy_controller(&self, controller: &Controller) -> AflResult<()> {
        let result = self.destroy_inner(controller);
        self.track(result)
    }

    fn destroy_inner(&self, controller: &Controller) -> AflResult<()> {
        self.check_library(controller)?;
        let mut list = self.controllers.lock();
        let record = {
            let mut arena = self.library.controllers.write();
            let record = arena.get(controller.handle()).ok_or_else(stale)?;
            if record.owner() != Some(self.id) {
                return Err(AflError::InvalidParameter(format!(
                    "{} controller is not owned by this manager",
                    record.kind()
                )));
            }
            arena.remove(controller.handle()).ok_or_else(stale)?
        };
        list.retain(|(_, h)| *h != controller.handle());
        drop(list);
        record.invalidate();
        info!(manager = self.id.0, controller = %record.kind(), "controller destroyed");
        Ok(())
    }

    /// Remove and invalidate every owned controller.
    pub fn destroy_all_controller(&self) -> AflResult<()> {
        let result = self
            .library
            .ensure_initialized()
            .map(|()| self.destroy_all_inner());
        self.track(result)
    }

    fn destroy_all_inner(&self) {
        let handles: Vec<_> = self.controllers.lock().drain(..).collect();
        let records: Vec<_> = {
            let mut arena = self.library.controllers.write();
            handles
                .iter()
                .filter_map(|(_, handle)| arena.remove(*handle))
                .collect()
        };
        for record in &records {
            record.invalidate();
        }
        if !records.is_empty() {
            info!(manager = self.id.0, count = records.len(), "all controllers destroyed");
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Handles to every owned controller.
    pub fn controller_list(&self) -> AflResult<Vec<Controller>> {
        let result = self.library.ensure_initialized().map(|()| {
            let list = self.controllers.lock();
            let arena = self.library.controllers.read();
            list.iter()
                .filter_map(|(_, handle)| {
                    arena
                        .get(*handle)
                        .map(|record| Controller::attach(&self.library, *handle, record))
                })
                .collect()
        });
        self.track(result)
    }

    /// Number of owned controllers.
    pub fn controller_count(&self) -> usize {
        self.controllers.lock().len()
    }

    /// Owned controller of `kind`. Fails with `Error` when there is none.
    pub fn get_controller(&self, kind: ControllerType) -> AflResult<Controller> {
        let result = self.library.ensure_initialized().and_then(|()| {
            let list = self.controllers.lock();
            let arena = self.library.controllers.read();
            list.iter()
                .find(|(k, _)| *k == kind)
                .and_then(|(_, handle)| {
                    arena
                        .get(*handle)
                        .map(|record| Controller::attach(&self.library, *handle, record))
                })
                .ok_or_else(|| AflError::Error(format!("manager holds no {kind} controller")))
        });
        self.track(result)
    }

    /// Whether a `process` call is in flight.
    pub fn status(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Frames evaluated since the manager was created.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// Bind the host gain actuator used for brightness gain and white balance.
    pub fn set_host_gain(&self, gain: Arc<dyn GainActuator>) {
        *self.host_gain.write() = Some(gain);
    }

    /// Fall back to the device's analog gain.
    pub fn clear_host_gain(&self) {
        *self.host_gain.write() = None;
    }

    // =========================================================================
    // Processing
    // =========================================================================

    /// Evaluate every owned controller against one frame.
    ///
    /// Blocks until all controllers are done and runs their callbacks on the
    /// calling thread. A concurrent call fails immediately with `Busy`; the
    /// caller drops that frame. Every controller is evaluated even when one
    /// fails; the first failure is returned.
    pub fn process(&self, image: &Image) -> AflResult<()> {
        let result = self.process_inner(image);
        self.track(result)
    }

    fn process_inner(&self, image: &Image) -> AflResult<()> {
        self.library.ensure_initialized()?;
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(manager = self.id.0, "process rejected, previous frame still in flight");
            return Err(AflError::Busy(
                "manager is processing another frame".to_string(),
            ));
        }
        let _guard = RunningGuard(&self.running);

        image.validate()?;

        let records: Vec<Arc<ControllerRecord>> = {
            let list = self.controllers.lock();
            let arena = self.library.controllers.read();
            list.iter()
                .filter_map(|(_, handle)| arena.get(*handle).cloned())
                .collect()
        };
        let host_gain = self.host_gain.read().clone();
        let ctx = EvalContext {
            image,
            device: self.device.as_ref(),
            host_gain: host_gain.as_deref(),
        };

        let mut first_error = None;
        for record in &records {
            if !record.is_alive() {
                continue;
            }
            if let Err(e) = record.evaluate(&ctx) {
                warn!(manager = self.id.0, controller = %record.kind(), error = %e, "evaluation failed");
                first_error.get_or_insert(e);
            }
        }
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        first_error.map_or(Ok(()), Err)
    }
}

fn stale() -> AflError {
    AflError::Error("controller has been destroyed".to_string())
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.destroy_all_inner();
        debug!(manager = self.id.0, "manager dropped");
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("id", &self.id.0)
            .field("controllers", &self.controller_count())
            .field("running", &self.status())
            .finish()
    }
}
