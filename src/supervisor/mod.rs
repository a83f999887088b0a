//! # Supervision of capture units.
//!
//! - [`RecordingSupervisor`]: launches units, bounds their stop, drives batch shutdown
//! - [`ExecutionHandle`]: per-session cancellation token + abort handle
//! - [`StopOutcome`] / [`ShutdownReport`]: how stops ended
//! - [`wait_for_shutdown_signal`]: OS termination signals for hosts

mod control;
mod runner;
mod shutdown;
mod unit;

pub use control::{RecordingSupervisor, ShutdownReport};
pub use shutdown::wait_for_shutdown_signal;
pub use unit::{ExecutionHandle, StopOutcome};
