//! # LogWriter: events as `tracing` records
//!
//! Maps every [`Event`] to a `tracing` record. Level policy:
//! - `error`: backend failure, registration failure
//! - `warn`: forced termination, stop timeout, unknown/duplicate session, grace exceeded,
//!   channel aborted, subscriber trouble
//! - `info`: session lifecycle, registration, shutdown
//! - `debug`: channel open/close, registry bookkeeping
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO  tunervisor: session active session="…@…" card="A"
//! WARN  tunervisor: stop timeout hit session="…" timeout_ms=5000
//! WARN  tunervisor: session forcibly terminated; device state may be inconsistent session="…"
//! ERROR tunervisor: session failed session="…" reason="device: tuner lost lock"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let session = e.session.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::SessionFailed => {
                error!(target: "tunervisor", session, reason, "session failed");
            }
            EventKind::RegistrationFailed => {
                error!(target: "tunervisor", attempt = e.attempt, reason, "registration with peer failed");
            }
            EventKind::StopTimeoutHit => {
                warn!(target: "tunervisor", session, timeout_ms = e.timeout_ms, "stop timeout hit");
            }
            EventKind::SessionForced => {
                warn!(
                    target: "tunervisor",
                    session,
                    "session forcibly terminated; device state may be inconsistent"
                );
            }
            EventKind::UnknownSession => {
                warn!(target: "tunervisor", session, reason, "command for unknown session");
            }
            EventKind::DuplicateSession => {
                warn!(target: "tunervisor", session, "session already active");
            }
            EventKind::GraceExceeded => {
                warn!(target: "tunervisor", forced = reason, timeout_ms = e.timeout_ms, "shutdown forced sessions");
            }
            EventKind::ChannelAborted => {
                warn!(target: "tunervisor", endpoint = reason, "channel aborted");
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                warn!(target: "tunervisor", subscriber = session, reason, "subscriber trouble");
            }
            EventKind::SessionStarting => {
                info!(target: "tunervisor", session, card = e.card.as_deref(), "session starting");
            }
            EventKind::SessionActive => {
                info!(target: "tunervisor", session, card = e.card.as_deref(), "session active");
            }
            EventKind::SessionExtended => {
                info!(target: "tunervisor", session, stop = reason, "session window updated");
            }
            EventKind::SessionStopRequested => {
                info!(target: "tunervisor", session, reason, "session stop requested");
            }
            EventKind::SessionStopped => {
                info!(target: "tunervisor", session, "session stopped");
            }
            EventKind::NodeRegistered => {
                info!(target: "tunervisor", peer = reason, "registered with peer");
            }
            EventKind::ShutdownRequested => {
                info!(target: "tunervisor", "shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                info!(target: "tunervisor", "all sessions stopped within grace");
            }
            EventKind::SessionAdded | EventKind::SessionRemoved => {
                debug!(target: "tunervisor", session, kind = ?e.kind, "registry");
            }
            EventKind::ChannelOpened | EventKind::ChannelClosed => {
                debug!(target: "tunervisor", endpoint = reason, kind = ?e.kind, "channel");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
