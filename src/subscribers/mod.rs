//! # Event subscribers for the tunervisor runtime.
//!
//! Provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and the
//! embedded [`LogWriter`], which is how the node turns lifecycle events into
//! `tracing` records.
//!
//! ```text
//! Registry / Monitors / Façade ── publish(Event) ──► Bus ──► node listener
//!                                                               │
//!                                                       SubscriberSet::emit
//!                                                     ┌─────────┼─────────┐
//!                                                     ▼         ▼         ▼
//!                                                 LogWriter   custom     ...
//! ```

mod embedded;
mod set;
mod subscribe;

pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
