//! # Optional backend capabilities.
//!
//! Live streaming and teletext are separate from recording. A backend that does not
//! support them keeps the default methods, which answer with neutral values:
//! `NotSupported`, empty lists, `false`, `None`.

use async_trait::async_trait;

use crate::model::{
    Allocation, Channel, ChannelLiveState, LiveStream, LiveStreamResult, ServiceTuning,
    TeletextPage,
};

/// Live-stream command group.
#[async_trait]
pub trait LiveStreaming: Send + Sync {
    /// Tunes `channel` for live viewing, optionally re-using `live_stream`.
    async fn tune_live_stream(
        &self,
        _channel: &Channel,
        _upcoming_allocation: Option<&Allocation>,
        _live_stream: Option<LiveStream>,
    ) -> (LiveStreamResult, Option<LiveStream>) {
        (LiveStreamResult::NotSupported, None)
    }

    async fn stop_live_stream(&self, _live_stream: &LiveStream) {}

    async fn get_live_streams(&self) -> Vec<LiveStream> {
        Vec::new()
    }

    /// Returns `false` once the stream is gone.
    async fn keep_live_stream_alive(&self, _live_stream: &LiveStream) -> bool {
        false
    }

    async fn get_channels_live_state(
        &self,
        _channels: &[Channel],
        _live_stream: Option<&LiveStream>,
    ) -> Option<Vec<ChannelLiveState>> {
        None
    }

    async fn get_live_stream_tuning_details(
        &self,
        _live_stream: &LiveStream,
    ) -> Option<ServiceTuning> {
        None
    }
}

/// Teletext command group.
#[async_trait]
pub trait Teletext: Send + Sync {
    async fn has_teletext(&self, _live_stream: &LiveStream) -> bool {
        false
    }

    async fn start_grabbing_teletext(&self, _live_stream: &LiveStream) {}

    async fn stop_grabbing_teletext(&self, _live_stream: &LiveStream) {}

    async fn is_grabbing_teletext(&self, _live_stream: &LiveStream) -> bool {
        false
    }

    async fn get_teletext_page_bytes(
        &self,
        _live_stream: &LiveStream,
        _page_number: u32,
        _sub_page_number: u32,
    ) -> Option<TeletextPage> {
        None
    }
}

/// Capability adapter for backends without live or teletext support.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsupported;

impl LiveStreaming for Unsupported {}

impl Teletext for Unsupported {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn stream() -> LiveStream {
        LiveStream {
            rtsp_url: "rtsp://node/1".into(),
            card_id: "A".into(),
            channel: Channel::new(Uuid::nil(), "One"),
            stream_started_utc: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unsupported_answers_neutrally() {
        let live: &dyn LiveStreaming = &Unsupported;
        let (result, handed_out) = live
            .tune_live_stream(&Channel::new(Uuid::nil(), "One"), None, None)
            .await;
        assert_eq!(result, LiveStreamResult::NotSupported);
        assert!(handed_out.is_none());
        assert!(live.get_live_streams().await.is_empty());
        assert!(!live.keep_live_stream_alive(&stream()).await);

        let ttx: &dyn Teletext = &Unsupported;
        assert!(!ttx.has_teletext(&stream()).await);
        assert!(ttx.get_teletext_page_bytes(&stream(), 100, 0).await.is_none());
    }
}
