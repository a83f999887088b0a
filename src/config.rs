//! # Node configuration.
//!
//! Provides [`NodeConfig`] centralized settings for the recorder node runtime.
//!
//! Config is used in three places:
//! 1. **Supervision**: stop grace and start bound for every recording session
//! 2. **Transport**: call timeout and frame ceiling for both endpoints
//! 3. **Registration**: retry policy for the `initialize` handshake
//!
//! ## Sentinel values
//! - `stop_grace = 0s` → no graceful wait, force immediately
//! - `start_timeout = 0s` → wait for device engagement without bound
//! - `call_timeout = 0s` → no per-call bound
//!
//! ## File format
//! ```toml
//! name = "dvb-node-1"
//! stop_grace_ms = 5000
//! start_timeout_ms = 30000
//! call_timeout_ms = 1800000
//! tcp_port = 49942
//! pipe_dir = "/run/tunervisor"
//!
//! [registration]
//! attempts = 3
//! first_ms = 500
//! max_ms = 5000
//! factor = 2.0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::policies::{BackoffPolicy, JitterPolicy};

/// Default TCP port of the command surface.
pub const DEFAULT_TCP_PORT: u16 = 49942;

/// Global configuration for a recorder node.
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Display name sent to the peer during registration.
    pub name: String,

    /// Maximum time to wait for a session to stop gracefully before forcing it.
    pub stop_grace: Duration,

    /// Maximum time `start_recording` waits for the backend to engage the device.
    pub start_timeout: Duration,

    /// Round-trip bound for a single remote call (both directions).
    pub call_timeout: Duration,

    /// Largest accepted RPC frame in bytes.
    pub max_frame_len: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Port of the network endpoint.
    pub tcp_port: u16,

    /// Directory holding the local per-interface sockets.
    pub pipe_dir: PathBuf,

    /// Number of registration attempts during `initialize` (min 1).
    pub registration_attempts: u32,

    /// Delay policy between registration attempts.
    pub registration_backoff: BackoffPolicy,
}

impl NodeConfig {
    /// Returns the graceful-stop bound.
    #[inline]
    pub fn stop_grace(&self) -> Duration {
        self.stop_grace
    }

    /// Returns the device-engagement bound as an `Option` (`None` = unbounded).
    #[inline]
    pub fn start_timeout(&self) -> Option<Duration> {
        (self.start_timeout > Duration::ZERO).then_some(self.start_timeout)
    }

    /// Returns the per-call bound as an `Option` (`None` = unbounded).
    #[inline]
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout > Duration::ZERO).then_some(self.call_timeout)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the registration attempt count clamped to a minimum of 1.
    #[inline]
    pub fn registration_attempts_clamped(&self) -> u32 {
        self.registration_attempts.max(1)
    }

    /// Path of the local socket serving `interface`.
    pub fn pipe_path(&self, interface: &str) -> PathBuf {
        self.pipe_dir.join(format!("{interface}.sock"))
    }

    /// Parses a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(s)?;
        raw.into_config()
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

impl Default for NodeConfig {
    /// Default configuration:
    ///
    /// - `stop_grace = 5s`
    /// - `start_timeout = 30s`
    /// - `call_timeout = 30min` (allocation probing may be slow)
    /// - `max_frame_len = usize::MAX` (effectively unbounded)
    /// - `bus_capacity = 1024`
    /// - `registration_attempts = 1` (no retry)
    fn default() -> Self {
        Self {
            name: "tunervisor".to_string(),
            stop_grace: Duration::from_secs(5),
            start_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(30 * 60),
            max_frame_len: usize::MAX,
            bus_capacity: 1024,
            tcp_port: DEFAULT_TCP_PORT,
            pipe_dir: default_pipe_dir(),
            registration_attempts: 1,
            registration_backoff: BackoffPolicy {
                first: Duration::from_millis(500),
                max: Duration::from_secs(10),
                factor: 2.0,
                jitter: JitterPolicy::Equal,
            },
        }
    }
}

fn default_pipe_dir() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join("tunervisor")
}

/// On-disk shape; durations are milliseconds.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    name: Option<String>,
    stop_grace_ms: Option<u64>,
    start_timeout_ms: Option<u64>,
    call_timeout_ms: Option<u64>,
    max_frame_len: Option<usize>,
    bus_capacity: Option<usize>,
    tcp_port: Option<u16>,
    pipe_dir: Option<PathBuf>,
    #[serde(default)]
    registration: RawRegistration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRegistration {
    attempts: Option<u32>,
    first_ms: Option<u64>,
    max_ms: Option<u64>,
    factor: Option<f64>,
}

impl RawConfig {
    fn into_config(self) -> Result<NodeConfig, ConfigError> {
        let mut cfg = NodeConfig::default();

        if let Some(name) = self.name {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "name",
                    reason: "must not be empty".into(),
                });
            }
            cfg.name = name;
        }
        if let Some(ms) = self.stop_grace_ms {
            cfg.stop_grace = Duration::from_millis(ms);
        }
        if let Some(ms) = self.start_timeout_ms {
            cfg.start_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.call_timeout_ms {
            cfg.call_timeout = Duration::from_millis(ms);
        }
        if let Some(len) = self.max_frame_len {
            cfg.max_frame_len = len;
        }
        if let Some(cap) = self.bus_capacity {
            cfg.bus_capacity = cap;
        }
        if let Some(port) = self.tcp_port {
            cfg.tcp_port = port;
        }
        if let Some(dir) = self.pipe_dir {
            cfg.pipe_dir = dir;
        }

        let reg = self.registration;
        if let Some(n) = reg.attempts {
            cfg.registration_attempts = n;
        }
        if let Some(ms) = reg.first_ms {
            cfg.registration_backoff.first = Duration::from_millis(ms);
        }
        if let Some(ms) = reg.max_ms {
            cfg.registration_backoff.max = Duration::from_millis(ms);
        }
        if let Some(factor) = reg.factor {
            if !factor.is_finite() || factor < 1.0 {
                return Err(ConfigError::Invalid {
                    field: "registration.factor",
                    reason: format!("{factor} is not a finite value >= 1.0"),
                });
            }
            cfg.registration_backoff.factor = factor;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_node_contract() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.stop_grace(), Duration::from_secs(5));
        assert_eq!(cfg.call_timeout(), Some(Duration::from_secs(1800)));
        assert_eq!(cfg.max_frame_len, usize::MAX);
        assert_eq!(cfg.registration_attempts_clamped(), 1);
    }

    #[test]
    fn zero_sentinels_disable_bounds() {
        let cfg = NodeConfig::from_toml_str("start_timeout_ms = 0\ncall_timeout_ms = 0").unwrap();
        assert_eq!(cfg.start_timeout(), None);
        assert_eq!(cfg.call_timeout(), None);
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let cfg = NodeConfig::from_toml_str(
            r#"
            name = "dvb-1"
            stop_grace_ms = 250
            tcp_port = 50000

            [registration]
            attempts = 3
            factor = 1.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.name, "dvb-1");
        assert_eq!(cfg.stop_grace, Duration::from_millis(250));
        assert_eq!(cfg.tcp_port, 50000);
        assert_eq!(cfg.registration_attempts, 3);
        assert_eq!(cfg.registration_backoff.factor, 1.5);
        assert_eq!(cfg.bus_capacity, 1024);
    }

    #[test]
    fn unknown_keys_and_bad_values_are_rejected() {
        assert!(matches!(
            NodeConfig::from_toml_str("grace = 5"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            NodeConfig::from_toml_str("[registration]\nfactor = 0.5"),
            Err(ConfigError::Invalid { field: "registration.factor", .. })
        ));
        assert!(matches!(
            NodeConfig::from_toml_str("name = \"  \""),
            Err(ConfigError::Invalid { field: "name", .. })
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pipe_dir = \"/run/tv\"").unwrap();
        let cfg = NodeConfig::load(file.path()).unwrap();
        assert_eq!(cfg.pipe_path("RecorderTunerService"), PathBuf::from("/run/tv/RecorderTunerService.sock"));

        let missing = NodeConfig::load("/definitely/not/here.toml");
        assert!(matches!(missing, Err(ConfigError::FileRead { .. })));
    }
}
