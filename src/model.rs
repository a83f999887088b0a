//! # Data contracts exchanged with the scheduling peer.
//!
//! These are the values that travel over the command surface: channels, programs,
//! card/channel allocations and the live-stream/teletext payloads. They are plain
//! serde structs; the node never persists them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version value answered by `ping`.
pub const RECORDER_API_VERSION: i32 = 60;

/// Kind of broadcast a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ChannelType {
    #[default]
    Television,
    Radio,
}

/// A tunable source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: Uuid,
    pub display_name: String,
    #[serde(default)]
    pub channel_type: ChannelType,
}

impl Channel {
    pub fn new(channel_id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            channel_id,
            display_name: display_name.into(),
            channel_type: ChannelType::Television,
        }
    }
}

/// A committed (device, channel) pairing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Allocation {
    pub card_id: String,
    pub channel_id: Uuid,
}

impl Allocation {
    pub fn new(card_id: impl Into<String>, channel_id: Uuid) -> Self {
        Self {
            card_id: card_id.into(),
            channel_id,
        }
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.card_id, self.channel_id)
    }
}

/// A program the peer decided to record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcomingProgram {
    pub upcoming_program_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub episode: Option<String>,
    pub channel: Channel,
    pub start_time_utc: DateTime<Utc>,
    pub stop_time_utc: DateTime<Utc>,
    #[serde(default)]
    pub pre_record_seconds: u32,
    #[serde(default)]
    pub post_record_seconds: u32,
}

impl UpcomingProgram {
    /// Title used in log lines: `"<title> - <episode> (<channel>)"`.
    pub fn display_title(&self) -> String {
        match &self.episode {
            Some(ep) if !ep.is_empty() => {
                format!("{} - {} ({})", self.title, ep, self.channel.display_name)
            }
            _ => format!("{} ({})", self.title, self.channel.display_name),
        }
    }
}

/// Recording time window; `stop_utc` may move while the session is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingWindow {
    pub start_utc: DateTime<Utc>,
    pub stop_utc: DateTime<Utc>,
}

impl RecordingWindow {
    pub fn new(start_utc: DateTime<Utc>, stop_utc: DateTime<Utc>) -> Self {
        Self {
            start_utc,
            stop_utc,
        }
    }

    /// True once `now` has reached the stop time.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.stop_utc
    }
}

/// An active live stream handed out by a backend with live support.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStream {
    pub rtsp_url: String,
    pub card_id: String,
    pub channel: Channel,
    pub stream_started_utc: DateTime<Utc>,
}

/// Outcome of a live tune request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiveStreamResult {
    Succeeded,
    Failed,
    NoFreeCardFound,
    ChannelTuneFailed,
    NoRetunePossible,
    IsScrambled,
    NotSupported,
}

/// Whether a channel can currently be tuned live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLiveState {
    Tunable,
    NotTunable,
    NoFreeCard,
}

/// Low-level tuning details of a live stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTuning {
    pub name: String,
    pub frequency_khz: u32,
    pub service_id: u32,
    #[serde(default)]
    pub signal_quality: Option<u8>,
    #[serde(default)]
    pub signal_strength: Option<u8>,
}

/// A teletext page as returned by `get_teletext_page_bytes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeletextPage {
    pub bytes: Vec<u8>,
    pub sub_page_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn program(episode: Option<&str>) -> UpcomingProgram {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap();
        UpcomingProgram {
            upcoming_program_id: Uuid::nil(),
            title: "News".into(),
            episode: episode.map(str::to_string),
            channel: Channel::new(Uuid::nil(), "One"),
            start_time_utc: start,
            stop_time_utc: start + chrono::Duration::minutes(30),
            pre_record_seconds: 0,
            post_record_seconds: 0,
        }
    }

    #[test]
    fn display_title_includes_episode_when_present() {
        assert_eq!(program(None).display_title(), "News (One)");
        assert_eq!(program(Some("")).display_title(), "News (One)");
        assert_eq!(
            program(Some("Late edition")).display_title(),
            "News - Late edition (One)"
        );
    }

    #[test]
    fn window_end_is_inclusive() {
        let p = program(None);
        let w = RecordingWindow::new(p.start_time_utc, p.stop_time_utc);
        assert!(!w.has_ended(p.start_time_utc));
        assert!(w.has_ended(p.stop_time_utc));
    }
}
