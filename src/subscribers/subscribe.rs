//! # Subscriber contract.
//!
//! Implement [`Subscribe`] to observe session and channel lifecycle, e.g. to notify
//! the scheduling peer of failed recordings or to export counters:
//!
//! ```rust
//! use tunervisor::{Event, EventKind, Subscribe};
//!
//! struct FailedRecordings;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for FailedRecordings {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::SessionFailed {
//!             eprintln!("recording {:?} failed: {:?}", ev.session, ev.reason);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "failed-recordings"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receives every event published on the node's bus, in publish order.
///
/// Runs on a dedicated worker; a slow implementation only delays itself. When its
/// queue is full, further events for it are dropped.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    /// Name used in overflow and panic reports.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue length before events are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
