use std::fmt;
use std::sync::Arc;

use crate::model::UpcomingProgram;

/// Identity of a recording session.
///
/// Derived from the program and the channel it airs on, so two requests for the same
/// program+channel resolve to the same identity regardless of the card they land on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// `"<upcoming_program_id>@<channel_id>"`.
    pub fn for_program(program: &UpcomingProgram) -> Self {
        Self(
            format!(
                "{}@{}",
                program.upcoming_program_id, program.channel.channel_id
            )
            .into(),
        )
    }

    /// Wraps an already-derived key.
    pub fn from_raw(raw: impl Into<Arc<str>>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&SessionId> for Arc<str> {
    fn from(id: &SessionId) -> Self {
        Arc::clone(&id.0)
    }
}
