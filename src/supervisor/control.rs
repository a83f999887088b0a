//! # Recording supervisor: launches capture units, bounds their stop, drives shutdown.
//!
//! The [`RecordingSupervisor`] owns no sessions; the [`SessionRegistry`] does. For every
//! session it starts two tasks:
//!
//! ```text
//! start(record)
//!   ├─► capture task:  runner::run_capture(backend, record)      (abortable)
//!   └─► monitor task:  capture.await → finalize → registry.remove(record)
//!
//! await_or_force(record, grace)
//!   ├─ terminal within grace → Graceful / Failed
//!   └─ timeout → StopTimeoutHit + SessionForced → abort capture task
//!                  └─► finalize(Stopped) → Forced     (monitor's later finalize is a no-op)
//!
//! shutdown_all()
//!   snapshot → ShutdownRequested → request_stop(every session)
//!            → await_or_force(each, grace) concurrently
//!            → AllStoppedWithin | GraceExceeded
//! ```
//!
//! ## Rules
//! - The first finalize wins: the monitor's, or the forcing stop's; later ones only
//!   retry an identity-checked remove
//! - Every session is signalled before any is awaited, so shutdown takes about one grace
//!   period regardless of how many sessions are stuck
//! - Forcing never waits on the backend's cooperation

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinError;
use tokio::time;

use crate::backend::CaptureBackend;
use crate::config::NodeConfig;
use crate::error::{CaptureError, NodeError};
use crate::events::{Bus, Event, EventKind};
use crate::session::{SessionId, SessionRecord, SessionRegistry, SessionState};
use crate::supervisor::runner;
use crate::supervisor::unit::StopOutcome;

/// Per-session results of [`RecordingSupervisor::shutdown_all`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub graceful: Vec<SessionId>,
    pub forced: Vec<SessionId>,
    pub failed: Vec<SessionId>,
}

impl ShutdownReport {
    /// True when nothing had to be forced.
    pub fn is_clean(&self) -> bool {
        self.forced.is_empty()
    }

    pub fn total(&self) -> usize {
        self.graceful.len() + self.forced.len() + self.failed.len()
    }
}

/// Lifecycle controller of capture units.
pub struct RecordingSupervisor {
    cfg: Arc<NodeConfig>,
    bus: Bus,
    registry: Arc<SessionRegistry>,
    backend: Arc<dyn CaptureBackend>,
}

impl RecordingSupervisor {
    pub fn new(
        cfg: Arc<NodeConfig>,
        bus: Bus,
        registry: Arc<SessionRegistry>,
        backend: Arc<dyn CaptureBackend>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            bus,
            registry,
            backend,
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Launches the capture unit of `record` and waits for the device to engage.
    ///
    /// Returns `true` once the backend confirmed capture, even if the session already moved
    /// on to `Stopping` because its window was over. If engagement does not finish
    /// within `start_timeout`, the session is stopped in the background and `false` is
    /// returned.
    pub async fn start(self: &Arc<Self>, record: Arc<SessionRecord>) -> bool {
        if record.state().is_terminal() || record.execution().is_bound() {
            return false;
        }
        self.spawn_unit(Arc::clone(&record));

        let state = match self.cfg.start_timeout() {
            Some(bound) => match time::timeout(bound, record.wait_engaged()).await {
                Ok(state) => state,
                Err(_elapsed) => {
                    self.cooperative_stop(&record, "device engagement timed out");
                    self.reap(record);
                    return false;
                }
            },
            None => record.wait_engaged().await,
        };
        tracing::debug!(session = %record.id(), ?state, engaged = record.is_engaged(), "start settled");
        record.is_engaged()
    }

    /// Requests a cooperative stop of `record`. Never blocks.
    pub fn cooperative_stop(&self, record: &SessionRecord, reason: &str) {
        if record.request_stop() {
            self.bus.publish(
                Event::new(EventKind::SessionStopRequested)
                    .with_session(record.id())
                    .with_reason(reason),
            );
        }
    }

    /// Waits up to `timeout` for `record` to reach a terminal state, then forces it.
    ///
    /// `timeout = 0` forces immediately unless the session already ended.
    pub async fn await_or_force(&self, record: &Arc<SessionRecord>, timeout: Duration) -> StopOutcome {
        if let Ok(state) = time::timeout(timeout, record.wait_terminal()).await {
            return StopOutcome::from_terminal(state, record.execution().was_forced());
        }

        let timeout_err = NodeError::GracefulStopTimeout {
            id: record.id().clone(),
            timeout,
        };
        self.bus.publish(
            Event::new(EventKind::StopTimeoutHit)
                .with_session(record.id())
                .with_timeout(timeout)
                .with_reason(timeout_err.as_message()),
        );
        self.bus
            .publish(Event::new(EventKind::SessionForced).with_session(record.id()));

        // the aborted task may still be blocked inside the backend; the session ends here
        record.execution().force();
        Self::finalize(&self.registry, &self.bus, record, SessionState::Stopped, None).await;
        StopOutcome::from_terminal(record.state(), true)
    }

    /// Stops `record` in the background, bounded by `stop_grace`.
    pub fn reap(self: &Arc<Self>, record: Arc<SessionRecord>) {
        let me = Arc::clone(self);
        tokio::spawn(async move {
            let grace = me.cfg.stop_grace();
            me.await_or_force(&record, grace).await;
        });
    }

    /// Stops every registered session within one grace period.
    pub async fn shutdown_all(&self) -> ShutdownReport {
        let sessions = self.registry.drain_all().await;
        let grace = self.cfg.stop_grace();
        self.bus.publish(Event::new(EventKind::ShutdownRequested));

        for record in &sessions {
            self.cooperative_stop(record, "shutdown");
        }
        let outcomes = join_all(sessions.iter().map(|r| self.await_or_force(r, grace))).await;

        let mut report = ShutdownReport::default();
        for (record, outcome) in sessions.iter().zip(outcomes) {
            let id = record.id().clone();
            match outcome {
                StopOutcome::Graceful => report.graceful.push(id),
                StopOutcome::Forced => report.forced.push(id),
                StopOutcome::Failed => report.failed.push(id),
            }
        }

        if report.is_clean() {
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
        } else {
            let forced: Vec<&str> = report.forced.iter().map(SessionId::as_str).collect();
            self.bus.publish(
                Event::new(EventKind::GraceExceeded)
                    .with_reason(forced.join(","))
                    .with_timeout(grace),
            );
        }
        report
    }

    /// Spawns the capture task and its monitor.
    fn spawn_unit(&self, record: Arc<SessionRecord>) {
        let capture = tokio::spawn(runner::run_capture(
            Arc::clone(&self.backend),
            Arc::clone(&record),
            self.bus.clone(),
        ));
        record.execution().bind(capture.abort_handle());

        let registry = Arc::clone(&self.registry);
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let joined = capture.await;
            let (terminal, failure) = classify(&record, joined);
            Self::finalize(&registry, &bus, &record, terminal, failure).await;
        });
    }

    /// Applies the terminal state, publishes it and removes the record.
    async fn finalize(
        registry: &SessionRegistry,
        bus: &Bus,
        record: &Arc<SessionRecord>,
        terminal: SessionState,
        failure: Option<NodeError>,
    ) {
        if record.transition(terminal) {
            let ev = match failure {
                Some(err) => Event::new(EventKind::SessionFailed).with_reason(err.to_string()),
                None => Event::new(EventKind::SessionStopped),
            };
            bus.publish(ev.with_session(record.id()).with_card(record.card_id()));
        }
        registry.remove(record).await;
    }
}

/// Maps how the capture task ended onto a terminal state.
fn classify(
    record: &SessionRecord,
    joined: Result<Result<(), CaptureError>, JoinError>,
) -> (SessionState, Option<NodeError>) {
    let failed = |reason: String| {
        (
            SessionState::Failed,
            Some(NodeError::BackendFailure {
                id: record.id().clone(),
                reason,
            }),
        )
    };
    match joined {
        Ok(Ok(())) | Ok(Err(CaptureError::Canceled)) => (SessionState::Stopped, None),
        Ok(Err(err)) => failed(err.as_message()),
        Err(je) if je.is_cancelled() => (SessionState::Stopped, None),
        Err(_panic) => failed("capture unit panicked".to_string()),
    }
}
