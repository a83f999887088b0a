//! # Built-in subscribers
//!
//! - [`LogWriter`]: writes events as `tracing` records.

mod log;

pub use log::LogWriter;
