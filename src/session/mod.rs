//! # Recording sessions.
//!
//! - [`SessionId`]: identity derived from program + channel
//! - [`SessionState`]: the `Starting → Active → Stopping → Stopped | Failed` machine
//! - [`SessionRecord`]: one tracked session (window, state, execution handle)
//! - [`SessionRegistry`]: the concurrent identity → record map

mod id;
pub(crate) mod record;
mod registry;
mod state;

pub use id::SessionId;
pub use record::{SessionDraft, SessionRecord};
pub use registry::{SessionRegistry, ValidateOutcome};
pub use state::SessionState;
