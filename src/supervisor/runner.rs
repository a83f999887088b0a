//! # Capture unit: drives one session from device engagement to release.
//!
//! ```text
//! start_capture(record, ctx)
//!   ├─ Err(e)  → return Err(e)                      (monitor: Failed, or Stopped if Canceled)
//!   └─ Ok      → Active
//!                 └─ wait: stop time reached │ window moved (re-arm) │ ctx cancelled
//!                       └─ Stopping → stop_capture(record) → return
//! ```
//!
//! ## Rules
//! - The unit never touches the registry; the monitor finalizes
//! - Engagement is recorded before `Active`, so a start waiter never misses it
//! - A stop requested while the device was engaging leaves the session in `Stopping`
//!   and goes straight to `stop_capture`

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::backend::CaptureBackend;
use crate::error::CaptureError;
use crate::events::{Bus, Event, EventKind};
use crate::session::{SessionRecord, SessionState};

/// Why the wait phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndReason {
    WindowEnded,
    StopRequested,
}

/// Runs the capture unit of `record` to completion.
pub(crate) async fn run_capture(
    backend: Arc<dyn CaptureBackend>,
    record: Arc<SessionRecord>,
    bus: Bus,
) -> Result<(), CaptureError> {
    let ctx = record.execution().token();
    bus.publish(
        Event::new(EventKind::SessionStarting)
            .with_session(record.id())
            .with_card(record.card_id()),
    );

    backend.start_capture(&record, &ctx).await?;
    record.mark_engaged();

    if record.transition(SessionState::Active) {
        bus.publish(
            Event::new(EventKind::SessionActive)
                .with_session(record.id())
                .with_card(record.card_id()),
        );
        let reason = wait_for_end(&record, &ctx).await;
        if record.transition(SessionState::Stopping) && reason == EndReason::WindowEnded {
            bus.publish(
                Event::new(EventKind::SessionStopRequested)
                    .with_session(record.id())
                    .with_reason("stop time reached"),
            );
        }
    }

    backend.stop_capture(&record).await
}

/// Sleeps until the stop time, re-arming whenever the window moves.
async fn wait_for_end(record: &SessionRecord, ctx: &CancellationToken) -> EndReason {
    let mut window = record.watch_window();
    loop {
        let stop = window.borrow_and_update().stop_utc;
        let remaining = (stop - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        if remaining.is_zero() {
            return EndReason::WindowEnded;
        }

        tokio::select! {
            biased;
            _ = ctx.cancelled() => return EndReason::StopRequested,
            changed = window.changed() => {
                if changed.is_err() {
                    return sleep_or_cancel(remaining, ctx).await;
                }
            }
            _ = time::sleep(remaining) => {}
        }
    }
}

async fn sleep_or_cancel(remaining: Duration, ctx: &CancellationToken) -> EndReason {
    tokio::select! {
        _ = ctx.cancelled() => EndReason::StopRequested,
        _ = time::sleep(remaining) => EndReason::WindowEnded,
    }
}
