//! # tunervisor
//!
//! **Tunervisor** is the supervision runtime of a tuner/recorder node: a process that
//! owns capture hardware and records programs on behalf of a remote scheduling peer.
//!
//! The peer drives the node through a small command surface ([`TunerService`]). The
//! crate turns each accepted `start_recording` into a supervised capture unit, keeps
//! the set of live sessions consistent under concurrent commands, and stops every unit
//! within a bounded time on abort or shutdown. Device access is delegated to a
//! [`CaptureBackend`].
//!
//! ## Architecture
//! ```text
//!   scheduling peer ──(tcp / local socket)──► NodeHost ──► dispatch ──► RecorderNode
//!                                                                          │
//!        ┌─────────────────────────────────────────────────────────────────┤
//!        ▼                               ▼                                 ▼
//! ┌──────────────────┐       ┌──────────────────────┐         ┌─────────────────────┐
//! │ SessionRegistry  │◄──────│ RecordingSupervisor  │         │ ProxyRegistry       │
//! │ id → record      │remove │ spawn / stop / force │         │ one channel per     │
//! └──────┬───────────┘       └──────────┬───────────┘         │ endpoint (callback) │
//!        │                              ▼                     └─────────────────────┘
//!        │                    capture unit per session
//!        │                    (CaptureBackend::start/stop)
//!        ▼                              ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                       Bus (broadcast channel)                     │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                        SubscriberSet (LogWriter, ...)
//! ```
//!
//! ### Session lifecycle
//! ```text
//! start_recording ──► insert_if_absent ──► Starting
//!                                             ├─ backend engaged  ─► Active
//!                                             └─ engagement error ─► Failed
//! Active ── stop time / abort / shutdown ──► Stopping ──► Stopped
//!                                                 └─ grace expired ─► forced ─► Stopped
//! terminal state ──► removed from the registry
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Commands**      | Remote command surface and its default implementation.      | [`TunerService`], [`RecorderNode`]          |
//! | **Sessions**      | Identity, state machine, concurrent registry.                | [`SessionId`], [`SessionState`], [`SessionRegistry`] |
//! | **Supervision**   | Capture units with bounded graceful stop.                    | [`RecordingSupervisor`], [`ExecutionHandle`] |
//! | **Channels**      | Cached per-endpoint connections with safe close.             | [`ChannelProxy`], [`Endpoint`]              |
//! | **Events**        | Lifecycle events fanned out to subscribers.                  | [`Event`], [`Subscribe`]                    |
//! | **Configuration** | Grace periods, timeouts, endpoints, registration retry.      | [`NodeConfig`]                              |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use tunervisor::{NodeConfig, NodeHost, RecorderNode};
//! # use tunervisor::{Allocation, CaptureBackend, CaptureError, Channel, SessionRecord};
//! # use tokio_util::sync::CancellationToken;
//! # struct Dvb;
//! # #[async_trait::async_trait]
//! # impl CaptureBackend for Dvb {
//! #     fn name(&self) -> &str { "dvb" }
//! #     async fn allocate_card(&self, _: &Channel, _: &[Allocation], _: bool) -> Option<String> { None }
//! #     async fn start_capture(&self, _: &SessionRecord, _: &CancellationToken) -> Result<(), CaptureError> { Ok(()) }
//! #     async fn stop_capture(&self, _: &SessionRecord) -> Result<(), CaptureError> { Ok(()) }
//! #     fn recording_shares(&self) -> Vec<String> { Vec::new() }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = NodeConfig::load("/etc/tunervisor/node.toml")?;
//!     let node = RecorderNode::builder(cfg.clone(), Arc::new(Dvb)).build();
//!
//!     let host = NodeHost::bind(&cfg, node.clone()).await?;
//!     let report = host.run_until_signal(node).await;
//!     println!("stopped: {} graceful, {} forced", report.graceful.len(), report.forced.len());
//!     Ok(())
//! }
//! ```

pub mod allocation;
mod backend;
mod config;
mod error;
mod events;
mod model;
mod policies;
mod service;
mod session;
mod subscribers;
mod supervisor;
pub mod transport;

// ---- Public re-exports ----

pub use backend::CaptureBackend;
pub use config::{DEFAULT_TCP_PORT, NodeConfig};
pub use error::{CaptureError, ChannelError, ConfigError, NodeError};
pub use events::{Bus, Event, EventKind};
pub use model::{
    Allocation, Channel, ChannelLiveState, ChannelType, LiveStream, LiveStreamResult,
    RECORDER_API_VERSION, RecordingWindow, ServiceTuning, TeletextPage, UpcomingProgram,
};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use service::{
    CallbackAgent, LiveStreaming, NodeHost, RecorderNode, RecorderNodeBuilder, Teletext,
    TunerClient, TunerService, Unsupported, dispatch,
};
pub use session::{
    SessionDraft, SessionId, SessionRecord, SessionRegistry, SessionState, ValidateOutcome,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use supervisor::{
    ExecutionHandle, RecordingSupervisor, ShutdownReport, StopOutcome, wait_for_shutdown_signal,
};
pub use transport::{ChannelProxy, ChannelState, Endpoint};
