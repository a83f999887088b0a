use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::model::{Allocation, RecordingWindow, UpcomingProgram};
use crate::session::{SessionId, SessionState};
use crate::supervisor::ExecutionHandle;

/// Everything needed to register a new session.
#[derive(Debug, Clone)]
pub struct SessionDraft {
    pub id: SessionId,
    pub program: UpcomingProgram,
    pub allocation: Allocation,
    pub window: RecordingWindow,
    /// Scheduling peer that issued the start command.
    pub peer_host: String,
    pub peer_port: u16,
    /// Base file name the backend should record into.
    pub file_base: String,
}

/// One tracked recording session.
///
/// The window and the state are each held in a `watch` cell so the capture unit can
/// re-arm on a moved stop time and stop callers can await a terminal state.
#[derive(Debug)]
pub struct SessionRecord {
    id: SessionId,
    program: UpcomingProgram,
    allocation: Allocation,
    peer_host: String,
    peer_port: u16,
    file_base: String,
    window: watch::Sender<RecordingWindow>,
    state: watch::Sender<SessionState>,
    /// Set once the backend confirmed capture; never cleared.
    engaged: AtomicBool,
    execution: ExecutionHandle,
}

impl SessionRecord {
    /// New record in `Starting`.
    pub fn new(draft: SessionDraft) -> Self {
        let (window, _) = watch::channel(draft.window);
        let (state, _) = watch::channel(SessionState::Starting);
        Self {
            id: draft.id,
            program: draft.program,
            allocation: draft.allocation,
            peer_host: draft.peer_host,
            peer_port: draft.peer_port,
            file_base: draft.file_base,
            window,
            state,
            engaged: AtomicBool::new(false),
            execution: ExecutionHandle::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn program(&self) -> &UpcomingProgram {
        &self.program
    }

    pub fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    pub fn card_id(&self) -> &str {
        &self.allocation.card_id
    }

    /// `(host, port)` of the peer that scheduled this session.
    pub fn peer(&self) -> (&str, u16) {
        (&self.peer_host, self.peer_port)
    }

    pub fn file_base(&self) -> &str {
        &self.file_base
    }

    pub fn execution(&self) -> &ExecutionHandle {
        &self.execution
    }

    pub fn window(&self) -> RecordingWindow {
        *self.window.borrow()
    }

    pub(crate) fn watch_window(&self) -> watch::Receiver<RecordingWindow> {
        self.window.subscribe()
    }

    /// Moves the stop time. Rejected when it would not lie after the start.
    pub(crate) fn set_stop(&self, stop_utc: DateTime<Utc>) -> bool {
        self.window.send_if_modified(|w| {
            if stop_utc <= w.start_utc {
                return false;
            }
            w.stop_utc = stop_utc;
            true
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Applies a state change if the edge is allowed.
    pub(crate) fn transition(&self, next: SessionState) -> bool {
        self.state.send_if_modified(|cur| {
            if cur.can_transition_to(next) {
                *cur = next;
                true
            } else {
                false
            }
        })
    }

    /// Whether the device ever engaged, whatever state the session is in now.
    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }

    pub(crate) fn mark_engaged(&self) {
        self.engaged.store(true, Ordering::Release);
    }

    /// Cancels the capture unit and moves to `Stopping` when still live.
    ///
    /// Returns `true` if the state changed.
    pub(crate) fn request_stop(&self) -> bool {
        self.execution.cooperative_stop();
        self.transition(SessionState::Stopping)
    }

    /// Resolves once the device engaged or the session left `Starting` otherwise.
    pub async fn wait_engaged(&self) -> SessionState {
        self.wait_state(|s| *s != SessionState::Starting).await
    }

    /// Resolves once the session is `Stopped` or `Failed`.
    pub async fn wait_terminal(&self) -> SessionState {
        self.wait_state(|s| s.is_terminal()).await
    }

    async fn wait_state(&self, pred: impl FnMut(&SessionState) -> bool) -> SessionState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(pred).await {
            Ok(state) => *state,
            // sender lives as long as `self`
            Err(_) => self.state(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::Channel;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;
    use uuid::Uuid;

    /// Draft for program `n` on a fixed channel, window `[now, now + secs]`.
    pub(crate) fn draft(n: u128, card: &str, secs: i64) -> SessionDraft {
        let now = Utc::now();
        let channel = Channel::new(Uuid::from_u128(0xC0FFEE), "One");
        let program = UpcomingProgram {
            upcoming_program_id: Uuid::from_u128(n),
            title: format!("Program {n}"),
            episode: None,
            channel: channel.clone(),
            start_time_utc: now,
            stop_time_utc: now + ChronoDuration::seconds(secs),
            pre_record_seconds: 0,
            post_record_seconds: 0,
        };
        SessionDraft {
            id: SessionId::for_program(&program),
            allocation: Allocation::new(card, channel.channel_id),
            window: RecordingWindow::new(now, now + ChronoDuration::seconds(secs)),
            program,
            peer_host: "localhost".into(),
            peer_port: 49943,
            file_base: format!("program-{n}"),
        }
    }

    #[test]
    fn stop_must_follow_start() {
        let rec = SessionRecord::new(draft(1, "A", 60));
        let start = rec.window().start_utc;

        assert!(!rec.set_stop(start));
        assert!(!rec.set_stop(start - ChronoDuration::seconds(1)));
        assert!(rec.set_stop(start + ChronoDuration::seconds(5)));
        assert_eq!(rec.window().stop_utc, start + ChronoDuration::seconds(5));
        // same value again is accepted as a no-op
        assert!(rec.set_stop(start + ChronoDuration::seconds(5)));
    }

    #[test]
    fn request_stop_is_idempotent() {
        let rec = SessionRecord::new(draft(1, "A", 60));
        assert!(rec.request_stop());
        assert!(!rec.request_stop());
        assert_eq!(rec.state(), SessionState::Stopping);
        assert!(rec.execution().is_stop_requested());
    }

    #[test]
    fn engagement_outlives_the_active_state() {
        let rec = SessionRecord::new(draft(1, "A", 60));
        assert!(!rec.is_engaged());

        rec.mark_engaged();
        assert!(rec.transition(SessionState::Active));
        assert!(rec.transition(SessionState::Stopping));
        assert!(rec.transition(SessionState::Stopped));
        assert!(rec.is_engaged());
    }

    #[tokio::test]
    async fn waiters_observe_terminal_state() {
        let rec = std::sync::Arc::new(SessionRecord::new(draft(1, "A", 60)));
        let waiter = {
            let rec = rec.clone();
            tokio::spawn(async move { rec.wait_terminal().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(rec.transition(SessionState::Active));
        assert!(rec.transition(SessionState::Failed));
        assert!(!rec.transition(SessionState::Stopped));

        assert_eq!(waiter.await.unwrap(), SessionState::Failed);
    }
}
