//! # Calls back into the scheduling peer.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{ChannelError, NodeError};
use crate::transport::ChannelProxy;
use crate::transport::wire::{CallbackRequest, CallbackResponse};

/// Typed client of the peer's callback surface over a [`ChannelProxy`].
///
/// The agent does not own the proxy's lifetime across calls; whoever opens a
/// conversation is expected to [`close`](Self::close) it.
pub struct CallbackAgent {
    proxy: Arc<ChannelProxy>,
}

impl CallbackAgent {
    pub fn new(proxy: Arc<ChannelProxy>) -> Self {
        Self { proxy }
    }

    /// Announces this node to the peer.
    pub async fn register_recorder_tuner(
        &self,
        recorder_tuner_id: Uuid,
        name: &str,
        version: &str,
    ) -> Result<(), NodeError> {
        let request = CallbackRequest::RegisterRecorderTuner {
            recorder_tuner_id,
            name: name.to_string(),
            version: version.to_string(),
        };
        match self.send(&request).await? {
            CallbackResponse::Ack => Ok(()),
            CallbackResponse::Error(msg) => Err(self.unavailable(ChannelError::Remote(msg))),
        }
    }

    /// Closes the underlying channel.
    pub async fn close(&self) -> Result<(), ChannelError> {
        self.proxy.close().await
    }

    async fn send(&self, request: &CallbackRequest) -> Result<CallbackResponse, NodeError> {
        let value = serde_json::to_value(request).map_err(|e| self.unavailable(e.into()))?;
        let reply = self.proxy.call(value).await?;
        serde_json::from_value(reply).map_err(|e| self.unavailable(e.into()))
    }

    fn unavailable(&self, source: ChannelError) -> NodeError {
        NodeError::ConnectionUnavailable {
            endpoint: self.proxy.endpoint().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Bus;
    use crate::transport::Endpoint;
    use crate::transport::proxy::tests::{CloseBehavior, FakeConnector};

    #[tokio::test]
    async fn ack_completes_registration() {
        let connector = FakeConnector::replying(
            CloseBehavior::Clean,
            serde_json::to_value(CallbackResponse::Ack).unwrap(),
        );
        let proxy = Arc::new(ChannelProxy::new(
            Endpoint::tcp("sched", 49943),
            connector.clone(),
            Bus::new(8),
        ));
        let agent = CallbackAgent::new(proxy.clone());

        agent
            .register_recorder_tuner(Uuid::nil(), "node", "0.3.0")
            .await
            .unwrap();
        agent.close().await.unwrap();
        assert!(!proxy.is_connected().await);
    }

    #[tokio::test]
    async fn peer_error_is_reported() {
        let connector = FakeConnector::replying(
            CloseBehavior::Clean,
            serde_json::to_value(CallbackResponse::Error("unknown node".into())).unwrap(),
        );
        let proxy = Arc::new(ChannelProxy::new(
            Endpoint::tcp("sched", 49943),
            connector,
            Bus::new(8),
        ));
        let err = CallbackAgent::new(proxy)
            .register_recorder_tuner(Uuid::nil(), "node", "0.3.0")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown node"));
    }
}
