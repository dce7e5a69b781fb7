//! Controller record stored in the library arena.

use super::capabilities::Capabilities;
use super::state::{ControllerState, EvalContext, Event};
use crate::library::ManagerId;
use afl_core::{AflError, AflResult, ControllerType};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Callback without arguments (finished, component finished).
pub type Callback = Arc<dyn Fn() + Send + Sync>;
/// Data processing callback receiving focus position and sharpness.
pub type DataCallback = Arc<dyn Fn(i32, i32) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Callbacks {
    pub finished: Option<Callback>,
    pub data: Option<DataCallback>,
    pub components: [Option<Callback>; 2],
}

#[derive(Debug, Default)]
struct Membership {
    owner: Option<ManagerId>,
    external_refs: usize,
}

/// Clears the in-flight flag when an evaluation ends, including on early return.
struct EvaluatingGuard<'a>(&'a AtomicBool);

impl Drop for EvaluatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(crate) struct ControllerRecord {
    kind: ControllerType,
    pub(crate) capabilities: Capabilities,
    pub(crate) state: Mutex<ControllerState>,
    pub(crate) callbacks: Mutex<Callbacks>,
    membership: Mutex<Membership>,
    alive: AtomicBool,
    evaluating: AtomicBool,
}

impl ControllerRecord {
    pub fn new(kind: ControllerType, owner: Option<ManagerId>, external_refs: usize) -> Self {
        Self {
            kind,
            capabilities: Capabilities::for_type(kind),
            state: Mutex::new(ControllerState::new(kind)),
            callbacks: Mutex::new(Callbacks::default()),
            membership: Mutex::new(Membership {
                owner,
                external_refs,
            }),
            alive: AtomicBool::new(true),
            evaluating: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> ControllerType {
        self.kind
    }

    pub fn owner(&self) -> Option<ManagerId> {
        self.membership.lock().owner
    }

    /// Claim the record for a manager unless another one already owns it.
    pub fn claim(&self, manager: ManagerId) -> AflResult<bool> {
        let mut membership = self.membership.lock();
        match membership.owner {
            Some(owner) if owner == manager => Ok(false),
            Some(_) => Err(AflError::AccessDenied(format!(
                "{} controller is owned by another manager",
                self.kind
            ))),
            None => {
                membership.owner = Some(manager);
                Ok(true)
            }
        }
    }

    /// Release a manager's ownership. Returns true when nothing references the record any more.
    pub fn disown(&self, manager: ManagerId) -> bool {
        let mut membership = self.membership.lock();
        if membership.owner == Some(manager) {
            membership.owner = None;
        }
        membership.owner.is_none() && membership.external_refs == 0
    }

    pub fn acquire_external(&self) {
        self.membership.lock().external_refs += 1;
    }

    /// Returns true when the last reference is gone.
    pub fn release_external(&self) -> bool {
        let mut membership = self.membership.lock();
        membership.external_refs = membership.external_refs.saturating_sub(1);
        membership.external_refs == 0 && membership.owner.is_none()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Mark the record dead and drop its callbacks.
    ///
    /// Must be called after the record has left the arena and with the arena
    /// lock released: dropping a callback may drop a `Controller`, which
    /// takes the arena lock.
    pub fn invalidate(&self) {
        self.alive.store(false, Ordering::Release);
        self.membership.lock().owner = None;
        self.state.lock().shut_down();
        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        drop(callbacks);
    }

    /// Evaluate one frame and run the resulting callbacks on the calling thread.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> AflResult<()> {
        if self
            .evaluating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.state.lock().mark_busy();
            warn!(controller = %self.kind, "overlapping evaluation rejected");
            return Err(AflError::Busy(format!(
                "{} controller is already evaluating a frame",
                self.kind
            )));
        }
        let _guard = EvaluatingGuard(&self.evaluating);

        let (events, result) = self.state.lock().evaluate(ctx);
        self.dispatch(events);
        result
    }

    fn dispatch(&self, events: Vec<Event>) {
        for event in events {
            if !self.is_alive() {
                return;
            }
            let callbacks = self.callbacks.lock();
            match event {
                Event::Finished => {
                    let cb = callbacks.finished.clone();
                    drop(callbacks);
                    if let Some(cb) = cb {
                        cb();
                    }
                }
                Event::ComponentFinished(component) => {
                    let cb = callbacks.components[component.slot()].clone();
                    drop(callbacks);
                    if let Some(cb) = cb {
                        cb();
                    }
                }
                Event::Data(position, sharpness) => {
                    let cb = callbacks.data.clone();
                    drop(callbacks);
                    if let Some(cb) = cb {
                        cb(position, sharpness);
                    }
                }
            }
        }
    }
}
