//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `SessionRegistry`, `RecordingSupervisor` (capture monitors),
//!   `RecorderNode` (façade), `ChannelProxy`, `SubscriberSet` workers.
//! - **Consumers**: the node listener, which fans out to the `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
