//! Retry delay policies.
//!
//! Used by the registration handshake: `initialize` may retry the callback to the
//! peer a configured number of times. The core itself never retries: channel creation
//! failures and backend failures propagate to the caller.
//!
//! ## Contents
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized re-registration
//!   when many nodes restart together

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
