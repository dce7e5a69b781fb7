//! Library lifecycle.
//!
//! A [`Library`] is created once by the application and handed to every
//! [`Manager`](crate::manager::Manager) and standalone
//! [`Controller`](crate::controller::Controller). It owns the arena of
//! controller records, so controllers created from different libraries never
//! see each other. After [`Library::exit`] every object created from it fails
//! with `NotInitialized`.

use crate::arena::{Arena, Handle};
use crate::controller::ControllerRecord;
use afl_core::{AflError, AflResult};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Library version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub struct Version {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Sub-minor version.
    pub subminor: u32,
    /// Patch level.
    pub patch: u32,
}

impl Version {
    fn current() -> Self {
        let part = |s: &str| s.parse::<u32>().unwrap_or(0);
        Self {
            major: part(env!("CARGO_PKG_VERSION_MAJOR")),
            minor: part(env!("CARGO_PKG_VERSION_MINOR")),
            subminor: part(env!("CARGO_PKG_VERSION_PATCH")),
            patch: 0,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.subminor, self.patch
        )
    }
}

/// Identifier of a manager within one library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ManagerId(pub(crate) u64);

pub(crate) struct LibraryInner {
    initialized: AtomicBool,
    pub(crate) controllers: RwLock<Arena<Arc<ControllerRecord>>>,
    next_manager_id: AtomicU64,
    last_error: Mutex<Option<AflError>>,
}

impl LibraryInner {
    pub(crate) fn ensure_initialized(&self) -> AflResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(AflError::NotInitialized)
        }
    }

    pub(crate) fn next_manager_id(&self) -> ManagerId {
        ManagerId(self.next_manager_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Remember a failed result as the last error and pass it through.
    pub(crate) fn track<T>(&self, result: AflResult<T>) -> AflResult<T> {
        if let Err(e) = &result {
            *self.last_error.lock() = Some(e.clone());
        }
        result
    }

    /// Drop one external reference; destroy the record when nothing holds it any more.
    pub(crate) fn release_external(&self, handle: Handle) {
        let removed = {
            let mut arena = self.controllers.write();
            let orphaned = arena
                .get(handle)
                .is_some_and(|record| record.release_external());
            if orphaned {
                arena.remove(handle)
            } else {
                None
            }
        };
        if let Some(record) = removed {
            debug!(controller = %record.kind(), "controller released by last reference");
            record.invalidate();
        }
    }
}

/// Handle to an initialized auto-feature library.
///
/// Cloning is cheap and every clone refers to the same library state.
#[derive(Clone)]
pub struct Library {
    pub(crate) inner: Arc<LibraryInner>,
}

impl Library {
    /// Initialize a library instance.
    pub fn init() -> Self {
        info!(version = %Version::current(), "auto-feature library initialized");
        Self {
            inner: Arc::new(LibraryInner {
                initialized: AtomicBool::new(true),
                controllers: RwLock::new(Arena::new()),
                next_manager_id: AtomicU64::new(1),
                last_error: Mutex::new(None),
            }),
        }
    }

    /// Shut the library down.
    ///
    /// All controllers are invalidated and every later call on objects
    /// created from this library fails with `NotInitialized`. Calling it
    /// twice fails the second time.
    pub fn exit(&self) -> AflResult<()> {
        if !self.inner.initialized.swap(false, Ordering::AcqRel) {
            return self.inner.track(Err(AflError::NotInitialized));
        }
        let records = self.inner.controllers.write().drain();
        for record in &records {
            record.invalidate();
        }
        info!(controllers = records.len(), "auto-feature library shut down");
        Ok(())
    }

    /// Whether [`Library::exit`] has not been called yet.
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Library version.
    pub fn version(&self) -> Version {
        Version::current()
    }

    /// Most recent error reported by any operation on objects from this library.
    pub fn last_error(&self) -> Option<AflError> {
        self.inner.last_error.lock().clone()
    }

    /// Number of live controllers across all managers.
    pub fn controller_count(&self) -> usize {
        self.inner.controllers.read().len()
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("initialized", &self.is_initialized())
            .field("controllers", &self.controller_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_format() {
        let version = Library::init().version();
        assert_eq!(
            version.to_string(),
            format!("{}.0", env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn test_exit_twice() {
        let lib = Library::init();
        assert!(lib.exit().is_ok());
        assert!(!lib.is_initialized());
        assert_eq!(lib.exit(), Err(AflError::NotInitialized));
        assert_eq!(lib.last_error(), Some(AflError::NotInitialized));
    }
}
