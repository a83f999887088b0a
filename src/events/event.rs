//! # Runtime events emitted by the registry, the supervisor and the façade.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Session lifecycle**: starting, active, extended, stop requested, stopped, failed
//! - **Supervision anomalies**: stop timeout hit, forced termination, duplicate/unknown session
//! - **Node and channel**: registration handshake, remote channel open/close/abort
//! - **Shutdown**: requested, all stopped within grace, grace exceeded
//!
//! The [`Event`] struct carries additional metadata such as timestamps, session identity,
//! card, reasons and timeouts.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tunervisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::StopTimeoutHit)
//!     .with_session("news@one")
//!     .with_reason("ignored stop")
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::StopTimeoutHit);
//! assert_eq!(ev.session.as_deref(), Some("news@one"));
//! assert_eq!(ev.timeout_ms, Some(5000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets `session` (subscriber name) and `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    SubscriberOverflow,

    // === Shutdown events ===
    /// Node shutdown requested (OS signal or explicit call).
    ShutdownRequested,

    /// All sessions stopped gracefully within the stop bound.
    AllStoppedWithin,

    /// At least one session had to be forcibly terminated during shutdown.
    ///
    /// Sets `reason` (forced session ids) and `timeout_ms`.
    GraceExceeded,

    // === Session lifecycle events ===
    /// Session record inserted into the registry (state `Starting`).
    SessionAdded,

    /// Capture unit launched; backend is engaging the device.
    ///
    /// Sets `session`, `card`.
    SessionStarting,

    /// Backend confirmed capture began.
    SessionActive,

    /// Stop time moved by a validate call.
    ///
    /// Sets `session`, `reason` (new stop time).
    SessionExtended,

    /// Cooperative stop requested (abort, shutdown or stale window).
    SessionStopRequested,

    /// Session did not stop within the graceful bound.
    ///
    /// Sets `session`, `timeout_ms`. Always followed by [`EventKind::SessionForced`].
    StopTimeoutHit,

    /// Capture unit was forcibly terminated; device state may be inconsistent.
    SessionForced,

    /// Session reached `Stopped`.
    SessionStopped,

    /// Session reached `Failed`.
    ///
    /// Sets `session`, `reason` (backend failure).
    SessionFailed,

    /// Session record removed from the registry after reaching a terminal state.
    SessionRemoved,

    /// Start command for an identity that is already registered.
    DuplicateSession,

    /// Validate/abort command for an identity that is not registered.
    UnknownSession,

    // === Node / channel events ===
    /// Node registered itself with the peer.
    NodeRegistered,

    /// Registration handshake failed; node keeps serving diagnostics.
    ///
    /// Sets `reason`, `attempt`.
    RegistrationFailed,

    /// Remote channel established.
    ///
    /// Sets `reason` (endpoint).
    ChannelOpened,

    /// Remote channel closed gracefully.
    ChannelClosed,

    /// Remote channel aborted (faulted or failed close).
    ChannelAborted,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Session identity, if applicable.
    pub session: Option<Arc<str>>,
    /// Capture card, if applicable.
    pub card: Option<Arc<str>>,
    /// Human-readable reason (errors, endpoints, new stop times, etc.).
    pub reason: Option<Arc<str>>,
    /// Stop bound in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            session: None,
            card: None,
            reason: None,
            timeout_ms: None,
            attempt: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a session identity.
    #[inline]
    pub fn with_session(mut self, session: impl Into<Arc<str>>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Attaches a capture card.
    #[inline]
    pub fn with_card(mut self, card: impl Into<Arc<str>>) -> Self {
        self.card = Some(card.into());
        self
    }

    /// Attaches a stop bound (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_session(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_session(subscriber)
            .with_reason(info)
    }

    /// True for events a subscriber worker emits about itself.
    #[inline]
    pub fn is_subscriber_internal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::SessionAdded);
        let b = Event::new(EventKind::SessionRemoved);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn timeout_saturates() {
        let ev = Event::new(EventKind::StopTimeoutHit).with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(ev.timeout_ms, Some(u32::MAX));
    }
}
