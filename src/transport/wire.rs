//! # Message shapes of the two remote surfaces.
//!
//! Requests are tagged `{"op": "...", "args": {...}}`; responses are tagged
//! `{"kind": "...", "value": ...}`. Command-level failures are regular values
//! (`Bool(false)`, `Card(None)`), while `Error` is reserved for requests the node could
//! not decode or dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{
    Allocation, Channel, ChannelLiveState, LiveStream, LiveStreamResult, ServiceTuning,
    TeletextPage, UpcomingProgram,
};

/// Arguments of `start_recording`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRecording {
    /// Peer to report back to.
    pub server_host: String,
    pub tcp_port: u16,
    pub allocation: Allocation,
    /// Actual capture start, including pre-record padding.
    pub start_time_utc: DateTime<Utc>,
    /// Actual capture stop, including post-record padding.
    pub stop_time_utc: DateTime<Utc>,
    pub program: UpcomingProgram,
    pub suggested_base_file_name: String,
}

/// Commands the scheduling peer sends to the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum TunerRequest {
    Ping,
    Initialize {
        node_id: Uuid,
        server_host: String,
        tcp_port: u16,
    },
    AllocateCard {
        channel: Channel,
        allocations: Vec<Allocation>,
        use_reverse_priority: bool,
    },
    StartRecording(StartRecording),
    ValidateAndUpdateRecording {
        allocation: Allocation,
        program: UpcomingProgram,
        stop_time_utc: DateTime<Utc>,
    },
    AbortRecording {
        server_host: String,
        tcp_port: u16,
        program: UpcomingProgram,
    },
    GetRecordingShares,
    GetTimeshiftShares,
    TuneLiveStream {
        channel: Channel,
        upcoming_allocation: Option<Allocation>,
        live_stream: Option<LiveStream>,
    },
    StopLiveStream {
        live_stream: LiveStream,
    },
    GetLiveStreams,
    KeepLiveStreamAlive {
        live_stream: LiveStream,
    },
    GetChannelsLiveState {
        channels: Vec<Channel>,
        live_stream: Option<LiveStream>,
    },
    GetLiveStreamTuningDetails {
        live_stream: LiveStream,
    },
    HasTeletext {
        live_stream: LiveStream,
    },
    StartGrabbingTeletext {
        live_stream: LiveStream,
    },
    StopGrabbingTeletext {
        live_stream: LiveStream,
    },
    IsGrabbingTeletext {
        live_stream: LiveStream,
    },
    GetTeletextPageBytes {
        live_stream: LiveStream,
        page_number: u32,
        sub_page_number: u32,
    },
}

impl TunerRequest {
    /// Stable operation name for logs.
    pub fn op(&self) -> &'static str {
        match self {
            TunerRequest::Ping => "ping",
            TunerRequest::Initialize { .. } => "initialize",
            TunerRequest::AllocateCard { .. } => "allocate_card",
            TunerRequest::StartRecording(_) => "start_recording",
            TunerRequest::ValidateAndUpdateRecording { .. } => "validate_and_update_recording",
            TunerRequest::AbortRecording { .. } => "abort_recording",
            TunerRequest::GetRecordingShares => "get_recording_shares",
            TunerRequest::GetTimeshiftShares => "get_timeshift_shares",
            TunerRequest::TuneLiveStream { .. } => "tune_live_stream",
            TunerRequest::StopLiveStream { .. } => "stop_live_stream",
            TunerRequest::GetLiveStreams => "get_live_streams",
            TunerRequest::KeepLiveStreamAlive { .. } => "keep_live_stream_alive",
            TunerRequest::GetChannelsLiveState { .. } => "get_channels_live_state",
            TunerRequest::GetLiveStreamTuningDetails { .. } => "get_live_stream_tuning_details",
            TunerRequest::HasTeletext { .. } => "has_teletext",
            TunerRequest::StartGrabbingTeletext { .. } => "start_grabbing_teletext",
            TunerRequest::StopGrabbingTeletext { .. } => "stop_grabbing_teletext",
            TunerRequest::IsGrabbingTeletext { .. } => "is_grabbing_teletext",
            TunerRequest::GetTeletextPageBytes { .. } => "get_teletext_page_bytes",
        }
    }
}

/// Answers to [`TunerRequest`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TunerResponse {
    Version(i32),
    Done,
    Bool(bool),
    Card(Option<String>),
    Shares(Vec<String>),
    LiveTune {
        result: LiveStreamResult,
        live_stream: Option<LiveStream>,
    },
    LiveStreams(Vec<LiveStream>),
    LiveStates(Option<Vec<ChannelLiveState>>),
    Tuning(Option<ServiceTuning>),
    Teletext(Option<TeletextPage>),
    Error(String),
}

/// Calls the node makes back into the scheduling peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum CallbackRequest {
    RegisterRecorderTuner {
        recorder_tuner_id: Uuid,
        name: String,
        version: String,
    },
}

/// Peer answers to [`CallbackRequest`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CallbackResponse {
    Ack,
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_are_tagged_by_operation() {
        let v = serde_json::to_value(TunerRequest::Ping).unwrap();
        assert_eq!(v, json!({ "op": "ping" }));

        let v = serde_json::to_value(TunerRequest::GetTeletextPageBytes {
            live_stream: LiveStream {
                rtsp_url: "rtsp://n/1".into(),
                card_id: "A".into(),
                channel: Channel::new(Uuid::nil(), "One"),
                stream_started_utc: Utc::now(),
            },
            page_number: 100,
            sub_page_number: 1,
        })
        .unwrap();
        assert_eq!(v["op"], "get_teletext_page_bytes");
        assert_eq!(v["args"]["page_number"], 100);
    }

    #[test]
    fn responses_decode_from_peer_json() {
        let resp: TunerResponse = serde_json::from_value(json!({ "kind": "card", "value": "B" })).unwrap();
        assert_eq!(resp, TunerResponse::Card(Some("B".into())));

        let ack: CallbackResponse = serde_json::from_value(json!({ "kind": "ack" })).unwrap();
        assert_eq!(ack, CallbackResponse::Ack);
    }
}
