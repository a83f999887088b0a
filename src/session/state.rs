/// Lifecycle state of a recording session.
///
/// ```text
/// Starting ──► Active ──► Stopping ──► Stopped
///    │           │           │
///    └───────────┴───────────┴───────► Failed
/// Starting ──► Stopping (stop requested before the device engaged)
/// ```
///
/// `Stopped` and `Failed` are terminal; nothing leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Capture unit launched, device not yet engaged.
    Starting,
    /// Backend confirmed capture.
    Active,
    /// Cooperative stop requested; capture is winding down.
    Stopping,
    /// Capture finished (gracefully or forcibly).
    Stopped,
    /// Backend failed irrecoverably.
    Failed,
}

impl SessionState {
    /// True for `Stopped` and `Failed`.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }

    /// Whether a validate command may still move the stop time.
    #[inline]
    pub fn accepts_updates(self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Active)
    }

    /// Allowed edges of the state machine.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Stopped | Failed, _) => false,
            (Starting, Active | Stopping | Stopped | Failed) => true,
            (Active, Stopping | Stopped | Failed) => true,
            (Stopping, Stopped | Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        }
    }
}
