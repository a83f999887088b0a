//! # Hardware backend contract.
//!
//! A [`CaptureBackend`] is the only code that touches a device. The supervision
//! core drives it through two hooks per session:
//!
//! ```text
//! start_capture(record, ctx) ──► Ok  → session Active, unit waits for stop time / ctx
//!                            └─► Err → session Failed (Canceled → Stopped)
//! stop_capture(record)       ──► device released, session Stopped
//! ```
//!
//! ## Cancellation contract
//! `ctx` fires on abort, shutdown or a stop time moved into the past. A backend should
//! return `Err(CaptureError::Canceled)` from `start_capture` when it notices. A backend
//! that ignores it is aborted after the graceful-stop bound.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::CaptureError;
use crate::model::{Allocation, Channel};
use crate::service::{LiveStreaming, Teletext, Unsupported};
use crate::session::SessionRecord;

/// Device-specific capture implementation.
#[async_trait]
pub trait CaptureBackend: Send + Sync + 'static {
    /// Name reported in logs.
    fn name(&self) -> &str;

    /// Picks a card able to receive `channel`, or `None`.
    ///
    /// `allocations` are the pairings already committed by the peer; see
    /// [`crate::allocation`] for helpers.
    async fn allocate_card(
        &self,
        channel: &Channel,
        allocations: &[Allocation],
        use_reverse_priority: bool,
    ) -> Option<String>;

    /// Engages the device and begins writing to `record.file_base()`.
    async fn start_capture(
        &self,
        record: &SessionRecord,
        ctx: &CancellationToken,
    ) -> Result<(), CaptureError>;

    /// Releases the device after the stop time or a stop request.
    async fn stop_capture(&self, record: &SessionRecord) -> Result<(), CaptureError>;

    /// Shares recordings are written to.
    fn recording_shares(&self) -> Vec<String>;

    /// Shares used for timeshift buffers.
    fn timeshift_shares(&self) -> Vec<String> {
        Vec::new()
    }

    fn live(&self) -> &dyn LiveStreaming {
        &Unsupported
    }

    fn teletext(&self) -> &dyn Teletext {
        &Unsupported
    }
}
