//! # Node-facing surfaces.
//!
//! - [`TunerService`] / [`RecorderNode`]: the command surface and its implementation
//! - [`NodeHost`] / [`TunerClient`]: serving and calling that surface over a channel
//! - [`CallbackAgent`]: the node's calls back into the scheduling peer
//! - [`LiveStreaming`] / [`Teletext`]: optional backend capability groups

mod callback;
mod capability;
mod facade;
mod host;

pub use callback::CallbackAgent;
pub use capability::{LiveStreaming, Teletext, Unsupported};
pub use facade::{RecorderNode, RecorderNodeBuilder, TunerService};
pub use host::{NodeHost, TunerClient, dispatch};
