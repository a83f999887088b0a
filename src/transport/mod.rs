//! # Remote channels.
//!
//! Both directions of the node's remote traffic go through here:
//! - inbound: the scheduling peer calls the [`TunerService`](crate::TunerService) surface,
//!   served by [`NodeHost`](crate::NodeHost)
//! - outbound: the node calls back into the peer (registration), through a
//!   [`ChannelProxy`] that caches one connection per endpoint
//!
//! ```text
//! Endpoint::Tcp { host, port }     ──► TCP socket
//! Endpoint::Local { interface }    ──► <pipe_dir>/<interface>.sock   (unix only)
//!
//! ChannelProxy ── Connector::connect ──► Arc<dyn Connection> ── call(json) ──► json
//! ```
//!
//! Frames are length-delimited JSON documents; see [`wire`] for the message shapes.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;

use crate::error::ChannelError;

pub(crate) mod proxy;
pub(crate) mod rpc;
pub mod wire;

pub use proxy::{ChannelProxy, ProxyRegistry};
pub use rpc::{RpcConnection, RpcConnector};

/// Well-known interface names of the local endpoint.
pub mod interfaces {
    /// Command surface served by the node.
    pub const RECORDER_TUNER: &str = "RecorderTunerService";
    /// Callback surface served by the scheduling peer.
    pub const RECORDER_CALLBACK: &str = "RecorderCallbackService";
}

/// Where a channel points.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Same-host socket named after the interface.
    Local { interface: String },
    /// Network endpoint.
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    pub fn local(interface: impl Into<String>) -> Self {
        Endpoint::Local {
            interface: interface.into(),
        }
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Local { interface } => write!(f, "local://{interface}"),
            Endpoint::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

/// Health of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    /// Usable.
    Opened = 0,
    /// A call failed mid-flight; the connection must be aborted and re-created.
    Faulted = 1,
    /// Closed by us or by the peer.
    Closed = 2,
}

impl ChannelState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => ChannelState::Opened,
            1 => ChannelState::Faulted,
            _ => ChannelState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Opened => "opened",
            ChannelState::Faulted => "faulted",
            ChannelState::Closed => "closed",
        }
    }
}

/// Lock-free [`ChannelState`] cell.
#[derive(Debug)]
pub struct AtomicChannelState(AtomicU8);

impl AtomicChannelState {
    pub fn new(state: ChannelState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> ChannelState {
        ChannelState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: ChannelState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves `Opened` to `state`; a closed connection stays closed.
    pub fn degrade(&self, state: ChannelState) {
        let _ = self.0.compare_exchange(
            ChannelState::Opened as u8,
            state as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// One established request/response channel.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    fn state(&self) -> ChannelState;

    /// Sends one request document and waits for its response.
    async fn call(&self, request: serde_json::Value) -> Result<serde_json::Value, ChannelError>;

    /// Graceful close; may block on the network.
    async fn close(&self) -> Result<(), ChannelError>;

    /// Immediate teardown; never blocks.
    fn abort(&self);
}

/// Establishes connections to endpoints.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Connection>, ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_display() {
        assert_eq!(Endpoint::tcp("sched", 49943).to_string(), "tcp://sched:49943");
        assert_eq!(
            Endpoint::local(interfaces::RECORDER_CALLBACK).to_string(),
            "local://RecorderCallbackService"
        );
    }

    #[test]
    fn degrade_keeps_closed() {
        let cell = AtomicChannelState::new(ChannelState::Opened);
        cell.degrade(ChannelState::Faulted);
        assert_eq!(cell.load(), ChannelState::Faulted);

        cell.store(ChannelState::Closed);
        cell.degrade(ChannelState::Faulted);
        assert_eq!(cell.load(), ChannelState::Closed);
    }
}
