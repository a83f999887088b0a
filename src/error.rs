//! Error types used by the tunervisor runtime, capture backends and the transport.
//!
//! This module defines four error enums:
//!
//! - [`NodeError`]: failures of the supervision core (registry, supervisor, proxy).
//! - [`CaptureError`]: failures raised by a hardware backend while engaging or releasing a device.
//! - [`ChannelError`]: failures of a remote channel (I/O, framing, timeouts, faults).
//! - [`ConfigError`]: failures while loading a [`NodeConfig`](crate::NodeConfig).
//!
//! All of them provide `as_label` (stable snake_case label for logs) and most provide
//! `as_message` for human-readable output.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::session::SessionId;

/// # Errors produced by the supervision core.
///
/// None of these cross the remote boundary: the command surface reports them as
/// `false` / `None` and publishes an event instead.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum NodeError {
    /// Remote channel could not be created or is faulted.
    #[error("channel to {endpoint} unavailable: {source}")]
    ConnectionUnavailable {
        /// Endpoint the channel targets.
        endpoint: String,
        /// Underlying transport failure.
        #[source]
        source: ChannelError,
    },

    /// A start command arrived for an identity that is already active.
    #[error("session {id} already exists")]
    DuplicateSession {
        /// Identity of the conflicting session.
        id: SessionId,
    },

    /// A validate/abort command referenced a session that is not registered.
    #[error("session {id} not found")]
    UnknownSession {
        /// Identity that was looked up.
        id: SessionId,
    },

    /// A session did not stop within the graceful bound and was forcibly terminated.
    #[error("session {id} did not stop within {timeout:?}; forced termination")]
    GracefulStopTimeout {
        /// Identity of the session.
        id: SessionId,
        /// The configured graceful-stop bound.
        timeout: Duration,
    },

    /// The hardware-specific execution unit failed irrecoverably.
    #[error("backend failure in session {id}: {reason}")]
    BackendFailure {
        /// Identity of the session.
        id: SessionId,
        /// Failure description.
        reason: String,
    },
}

impl NodeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use tunervisor::{NodeError, SessionId};
    ///
    /// let err = NodeError::UnknownSession { id: SessionId::from_raw("x") };
    /// assert_eq!(err.as_label(), "unknown_session");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            NodeError::ConnectionUnavailable { .. } => "connection_unavailable",
            NodeError::DuplicateSession { .. } => "duplicate_session",
            NodeError::UnknownSession { .. } => "unknown_session",
            NodeError::GracefulStopTimeout { .. } => "graceful_stop_timeout",
            NodeError::BackendFailure { .. } => "backend_failure",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            NodeError::ConnectionUnavailable { endpoint, source } => {
                format!("endpoint={endpoint} cause={}", source.as_label())
            }
            NodeError::DuplicateSession { id } => format!("duplicate: {id}"),
            NodeError::UnknownSession { id } => format!("unknown: {id}"),
            NodeError::GracefulStopTimeout { id, timeout } => {
                format!("forced after {timeout:?}: {id}")
            }
            NodeError::BackendFailure { id, reason } => format!("backend: {id}: {reason}"),
        }
    }

    /// Whether the error is a benign conflict the caller reports as `false` with a warning.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            NodeError::DuplicateSession { .. } | NodeError::UnknownSession { .. }
        )
    }
}

/// # Errors produced by a capture backend.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The backend refused to engage the device (busy, not tunable, ...).
    #[error("capture declined: {reason}")]
    Declined {
        /// Why the backend declined.
        reason: String,
    },

    /// The device failed irrecoverably.
    #[error("device failure: {error}")]
    Device {
        /// The underlying error message.
        error: String,
    },

    /// The backend observed a cooperative stop and exited early.
    #[error("capture cancelled")]
    Canceled,
}

impl CaptureError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            CaptureError::Declined { .. } => "capture_declined",
            CaptureError::Device { .. } => "capture_device_failure",
            CaptureError::Canceled => "capture_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            CaptureError::Declined { reason } => format!("declined: {reason}"),
            CaptureError::Device { error } => format!("device: {error}"),
            CaptureError::Canceled => "capture cancelled".to_string(),
        }
    }

    /// `Canceled` is a graceful exit, everything else ends the session as failed.
    pub fn is_graceful(&self) -> bool {
        matches!(self, CaptureError::Canceled)
    }
}

/// # Errors produced by a remote channel.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Socket-level failure (connect, read, write).
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),

    /// The operation exceeded its bound.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The channel is faulted and must be aborted.
    #[error("channel faulted")]
    Faulted,

    /// The channel was closed (by us or by the peer).
    #[error("channel closed")]
    Closed,

    /// The peer answered with an error.
    #[error("remote error: {0}")]
    Remote(String),

    /// The endpoint kind is not available on this platform.
    #[error("endpoint not supported: {0}")]
    Unsupported(String),
}

impl ChannelError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ChannelError::Io(_) => "channel_io",
            ChannelError::Codec(_) => "channel_codec",
            ChannelError::Timeout(_) => "channel_timeout",
            ChannelError::Faulted => "channel_faulted",
            ChannelError::Closed => "channel_closed",
            ChannelError::Remote(_) => "channel_remote",
            ChannelError::Unsupported(_) => "channel_unsupported",
        }
    }

    /// Communication or timeout failures; on close these are answered with an abort.
    pub fn is_communication(&self) -> bool {
        matches!(
            self,
            ChannelError::Io(_)
                | ChannelError::Timeout(_)
                | ChannelError::Faulted
                | ChannelError::Closed
        )
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl ConfigError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::FileRead { .. } => "config_file_read",
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_errors_are_flagged() {
        let dup = NodeError::DuplicateSession {
            id: SessionId::from_raw("a"),
        };
        let failed = NodeError::BackendFailure {
            id: SessionId::from_raw("a"),
            reason: "tuner lost lock".into(),
        };
        assert!(dup.is_benign());
        assert!(!failed.is_benign());
        assert_eq!(failed.as_label(), "backend_failure");
    }

    #[test]
    fn communication_failures_are_classified() {
        assert!(ChannelError::Timeout(Duration::from_secs(1)).is_communication());
        assert!(ChannelError::Faulted.is_communication());
        assert!(!ChannelError::Remote("boom".into()).is_communication());
        assert!(!ChannelError::Unsupported("pipe".into()).is_communication());
    }

    #[test]
    fn canceled_capture_is_graceful() {
        assert!(CaptureError::Canceled.is_graceful());
        assert!(
            !CaptureError::Device {
                error: "x".into()
            }
            .is_graceful()
        );
    }
}
