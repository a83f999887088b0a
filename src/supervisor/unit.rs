//! # Handle to a session's capture unit.
//!
//! Every session owns one [`ExecutionHandle`], created together with the record
//! and bound to the spawned capture task once the supervisor launches it.
//!
//! - `cooperative_stop()` fires the cancellation token the backend observes
//! - `force()` aborts the capture task at its next await point
//!
//! The handle does not finalize anything: the monitor task owning the capture
//! `JoinHandle` does, whichever way the task ended.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use crate::session::SessionState;

/// Cancellation token plus forcible-termination handle of one capture unit.
#[derive(Debug, Default)]
pub struct ExecutionHandle {
    cancel: CancellationToken,
    abort: OnceLock<AbortHandle>,
    forced: AtomicBool,
}

impl ExecutionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals the capture unit to wind down. Idempotent, never blocks.
    pub fn cooperative_stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token handed to the backend.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Binds the spawned capture task. Returns `false` if already bound.
    pub(crate) fn bind(&self, abort: AbortHandle) -> bool {
        self.abort.set(abort).is_ok()
    }

    /// True once a capture task has been attached.
    pub fn is_bound(&self) -> bool {
        self.abort.get().is_some()
    }

    /// Aborts the capture task. Returns `false` when no task was ever bound.
    pub(crate) fn force(&self) -> bool {
        self.forced.store(true, Ordering::Release);
        self.cancel.cancel();
        match self.abort.get() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Whether the unit was terminated via [`force`](Self::force).
    pub fn was_forced(&self) -> bool {
        self.forced.load(Ordering::Acquire)
    }
}

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Reached `Stopped` within the graceful bound.
    Graceful,
    /// Did not stop in time and was aborted.
    Forced,
    /// Ended in `Failed`.
    Failed,
}

impl StopOutcome {
    /// Forced terminations count as success: the session is gone either way.
    pub fn is_success(self) -> bool {
        !matches!(self, StopOutcome::Failed)
    }

    pub(crate) fn from_terminal(state: SessionState, forced: bool) -> Self {
        match (state, forced) {
            (SessionState::Failed, _) => StopOutcome::Failed,
            (_, true) => StopOutcome::Forced,
            (_, false) => StopOutcome::Graceful,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn force_without_task_reports_unbound() {
        let handle = ExecutionHandle::new();
        assert!(!handle.force());
        assert!(handle.was_forced());
        assert!(handle.is_stop_requested());
    }

    #[tokio::test]
    async fn force_aborts_bound_task() {
        let handle = ExecutionHandle::new();
        let task = tokio::spawn(std::future::pending::<()>());
        assert!(handle.bind(task.abort_handle()));
        assert!(!handle.bind(task.abort_handle()));

        assert!(handle.force());
        let err = task.await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn outcome_mapping() {
        assert_eq!(
            StopOutcome::from_terminal(SessionState::Stopped, false),
            StopOutcome::Graceful
        );
        assert_eq!(
            StopOutcome::from_terminal(SessionState::Stopped, true),
            StopOutcome::Forced
        );
        assert_eq!(
            StopOutcome::from_terminal(SessionState::Failed, true),
            StopOutcome::Failed
        );
        assert!(StopOutcome::Forced.is_success());
        assert!(!StopOutcome::Failed.is_success());
    }
}
