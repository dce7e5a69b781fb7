//! Device implementations.
//!
//! Production integrations implement [`crate::device::DeviceControl`] for
//! their camera driver. This module carries the simulated camera used by the
//! CLI, the integration tests and the benches.

pub mod sim;

pub use sim::SimulatedCamera;
