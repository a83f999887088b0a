//! # Command surface of a recorder node.
//!
//! [`TunerService`] is the contract the scheduling peer calls, whatever the transport.
//! [`RecorderNode`] implements it on top of the session registry, the recording
//! supervisor and a [`CaptureBackend`].
//!
//! ## Command semantics
//! ```text
//! start_recording    insert (duplicate → false) → supervisor.start → true iff engaged
//! validate_and_...   registry.validate_and_extend → updated   (allocation not consulted)
//! abort_recording    registry.request_stop (unknown → false) → background await_or_force
//! initialize         store node id → register with peer (retry) → close channel
//! ```
//! Failures never cross the boundary as errors: they come back as `false` / `None`
//! and are published on the bus.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::backend::CaptureBackend;
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::events::{Bus, Event, EventKind};
use crate::model::{
    Allocation, Channel, ChannelLiveState, LiveStream, LiveStreamResult, RECORDER_API_VERSION,
    RecordingWindow, ServiceTuning, TeletextPage, UpcomingProgram,
};
use crate::service::CallbackAgent;
use crate::session::{SessionDraft, SessionId, SessionRegistry};
use crate::subscribers::{LogWriter, Subscribe, SubscriberSet};
use crate::supervisor::{RecordingSupervisor, ShutdownReport};
use crate::transport::wire::StartRecording;
use crate::transport::{Connector, Endpoint, ProxyRegistry, RpcConnector};

/// Commands a recorder node answers.
#[async_trait]
pub trait TunerService: Send + Sync + 'static {
    /// API version of the node; works before `initialize`.
    async fn ping(&self) -> i32;

    /// Stores the node identity and registers with the peer at `server_host:tcp_port`.
    async fn initialize(&self, node_id: Uuid, server_host: &str, tcp_port: u16);

    async fn allocate_card(
        &self,
        channel: &Channel,
        allocations: &[Allocation],
        use_reverse_priority: bool,
    ) -> Option<String>;

    async fn start_recording(&self, request: StartRecording) -> bool;

    async fn validate_and_update_recording(
        &self,
        allocation: &Allocation,
        program: &UpcomingProgram,
        stop_time_utc: DateTime<Utc>,
    ) -> bool;

    async fn abort_recording(&self, server_host: &str, tcp_port: u16, program: &UpcomingProgram) -> bool;

    async fn get_recording_shares(&self) -> Vec<String>;

    async fn get_timeshift_shares(&self) -> Vec<String>;

    async fn tune_live_stream(
        &self,
        channel: &Channel,
        upcoming_allocation: Option<&Allocation>,
        live_stream: Option<LiveStream>,
    ) -> (LiveStreamResult, Option<LiveStream>);

    async fn stop_live_stream(&self, live_stream: &LiveStream);

    async fn get_live_streams(&self) -> Vec<LiveStream>;

    async fn keep_live_stream_alive(&self, live_stream: &LiveStream) -> bool;

    async fn get_channels_live_state(
        &self,
        channels: &[Channel],
        live_stream: Option<&LiveStream>,
    ) -> Option<Vec<ChannelLiveState>>;

    async fn get_live_stream_tuning_details(&self, live_stream: &LiveStream) -> Option<ServiceTuning>;

    async fn has_teletext(&self, live_stream: &LiveStream) -> bool;

    async fn start_grabbing_teletext(&self, live_stream: &LiveStream);

    async fn stop_grabbing_teletext(&self, live_stream: &LiveStream);

    async fn is_grabbing_teletext(&self, live_stream: &LiveStream) -> bool;

    async fn get_teletext_page_bytes(
        &self,
        live_stream: &LiveStream,
        page_number: u32,
        sub_page_number: u32,
    ) -> Option<TeletextPage>;
}

/// Builder for [`RecorderNode`].
pub struct RecorderNodeBuilder {
    cfg: NodeConfig,
    backend: Arc<dyn CaptureBackend>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    connector: Option<Arc<dyn Connector>>,
}

impl RecorderNodeBuilder {
    /// Replaces the event subscribers (default: a single [`LogWriter`]).
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces how callback channels are opened (default: [`RpcConnector`]).
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Wires the runtime together. Must be called inside a tokio runtime.
    pub fn build(self) -> Arc<RecorderNode> {
        let cfg = Arc::new(self.cfg);
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        subscriber_listener(&bus, Arc::clone(&subs));

        let registry = SessionRegistry::new(bus.clone());
        let supervisor = RecordingSupervisor::new(
            Arc::clone(&cfg),
            bus.clone(),
            Arc::clone(&registry),
            Arc::clone(&self.backend),
        );
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(RpcConnector::from_config(&cfg)) as Arc<dyn Connector>);
        let proxies = ProxyRegistry::new(connector, bus.clone());

        tracing::debug!(backend = self.backend.name(), subscribers = subs.len(), "recorder node built");
        Arc::new(RecorderNode {
            cfg,
            bus,
            registry,
            supervisor,
            backend: self.backend,
            proxies,
            node_id: RwLock::new(None),
        })
    }
}

/// Forwards bus events to the subscriber set until the bus closes.
fn subscriber_listener(bus: &Bus, set: Arc<SubscriberSet>) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => set.emit(&ev),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// A recorder node: the [`TunerService`] implementation over one capture backend.
pub struct RecorderNode {
    cfg: Arc<NodeConfig>,
    bus: Bus,
    registry: Arc<SessionRegistry>,
    supervisor: Arc<RecordingSupervisor>,
    backend: Arc<dyn CaptureBackend>,
    proxies: ProxyRegistry,
    node_id: RwLock<Option<Uuid>>,
}

impl RecorderNode {
    pub fn builder(cfg: NodeConfig, backend: Arc<dyn CaptureBackend>) -> RecorderNodeBuilder {
        RecorderNodeBuilder {
            cfg,
            backend,
            subscribers: vec![Arc::new(LogWriter::new()) as Arc<dyn Subscribe>],
            connector: None,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.cfg
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn supervisor(&self) -> &Arc<RecordingSupervisor> {
        &self.supervisor
    }

    /// Identity assigned by the last `initialize`, if any.
    pub async fn node_id(&self) -> Option<Uuid> {
        *self.node_id.read().await
    }

    /// Stops every session within one grace period and closes remote channels.
    pub async fn shutdown(&self) -> ShutdownReport {
        let report = self.supervisor.shutdown_all().await;
        self.proxies.close_all().await;
        report
    }

    /// Registers with the peer, retrying per the configured policy.
    ///
    /// The callback channel is closed on every path.
    async fn register(&self, node_id: Uuid, server_host: &str, tcp_port: u16) -> Result<(), NodeError> {
        let endpoint = Endpoint::tcp(server_host, tcp_port);
        let agent = CallbackAgent::new(self.proxies.proxy_for(&endpoint).await);
        let attempts = self.cfg.registration_attempts_clamped();

        let mut outcome = Ok(());
        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.cfg.registration_backoff.next(attempt - 2)).await;
            }
            outcome = agent
                .register_recorder_tuner(node_id, &self.cfg.name, env!("CARGO_PKG_VERSION"))
                .await;
            match &outcome {
                Ok(()) => break,
                Err(err) => self.bus.publish(
                    Event::new(EventKind::RegistrationFailed)
                        .with_attempt(attempt)
                        .with_reason(err.to_string()),
                ),
            }
        }

        if let Err(err) = agent.close().await {
            tracing::warn!(%endpoint, error = %err, "closing callback channel failed");
        }
        if outcome.is_ok() {
            self.bus
                .publish(Event::new(EventKind::NodeRegistered).with_reason(endpoint.to_string()));
        }
        outcome
    }

    fn unknown(&self, id: &SessionId, command: &'static str) {
        self.bus.publish(
            Event::new(EventKind::UnknownSession)
                .with_session(id)
                .with_reason(command),
        );
    }
}

#[async_trait]
impl TunerService for RecorderNode {
    async fn ping(&self) -> i32 {
        RECORDER_API_VERSION
    }

    async fn initialize(&self, node_id: Uuid, server_host: &str, tcp_port: u16) {
        *self.node_id.write().await = Some(node_id);
        // failure is published; the node keeps answering ping and diagnostics
        let _ = self.register(node_id, server_host, tcp_port).await;
    }

    async fn allocate_card(
        &self,
        channel: &Channel,
        allocations: &[Allocation],
        use_reverse_priority: bool,
    ) -> Option<String> {
        self.backend
            .allocate_card(channel, allocations, use_reverse_priority)
            .await
    }

    async fn start_recording(&self, request: StartRecording) -> bool {
        let id = SessionId::for_program(&request.program);
        if request.stop_time_utc <= request.start_time_utc {
            tracing::warn!(session = %id, "start rejected: stop time not after start time");
            return false;
        }
        let draft = SessionDraft {
            id: id.clone(),
            window: RecordingWindow::new(request.start_time_utc, request.stop_time_utc),
            allocation: request.allocation,
            program: request.program,
            peer_host: request.server_host,
            peer_port: request.tcp_port,
            file_base: request.suggested_base_file_name,
        };

        match self.registry.insert_if_absent(draft).await {
            Ok(record) => self.supervisor.start(record).await,
            Err(err) => {
                self.bus.publish(
                    Event::new(EventKind::DuplicateSession)
                        .with_session(&id)
                        .with_reason(err.as_message()),
                );
                false
            }
        }
    }

    async fn validate_and_update_recording(
        &self,
        allocation: &Allocation,
        program: &UpcomingProgram,
        stop_time_utc: DateTime<Utc>,
    ) -> bool {
        let id = SessionId::for_program(program);
        tracing::trace!(session = %id, %allocation, "validate requested");
        let outcome = self.registry.validate_and_extend(&id, stop_time_utc).await;
        if !outcome.found {
            self.unknown(&id, "validate_and_update_recording");
        }
        outcome.updated
    }

    async fn abort_recording(&self, server_host: &str, tcp_port: u16, program: &UpcomingProgram) -> bool {
        let id = SessionId::for_program(program);
        match self.registry.request_stop(&id).await {
            Some(record) => {
                tracing::debug!(session = %id, peer = %Endpoint::tcp(server_host, tcp_port), "abort requested");
                self.supervisor.reap(record);
                true
            }
            None => {
                self.unknown(&id, "abort_recording");
                false
            }
        }
    }

    async fn get_recording_shares(&self) -> Vec<String> {
        self.backend.recording_shares()
    }

    async fn get_timeshift_shares(&self) -> Vec<String> {
        self.backend.timeshift_shares()
    }

    async fn tune_live_stream(
        &self,
        channel: &Channel,
        upcoming_allocation: Option<&Allocation>,
        live_stream: Option<LiveStream>,
    ) -> (LiveStreamResult, Option<LiveStream>) {
        self.backend
            .live()
            .tune_live_stream(channel, upcoming_allocation, live_stream)
            .await
    }

    async fn stop_live_stream(&self, live_stream: &LiveStream) {
        self.backend.live().stop_live_stream(live_stream).await
    }

    async fn get_live_streams(&self) -> Vec<LiveStream> {
        self.backend.live().get_live_streams().await
    }

    async fn keep_live_stream_alive(&self, live_stream: &LiveStream) -> bool {
        self.backend.live().keep_live_stream_alive(live_stream).await
    }

    async fn get_channels_live_state(
        &self,
        channels: &[Channel],
        live_stream: Option<&LiveStream>,
    ) -> Option<Vec<ChannelLiveState>> {
        self.backend
            .live()
            .get_channels_live_state(channels, live_stream)
            .await
    }

    async fn get_live_stream_tuning_details(&self, live_stream: &LiveStream) -> Option<ServiceTuning> {
        self.backend
            .live()
            .get_live_stream_tuning_details(live_stream)
            .await
    }

    async fn has_teletext(&self, live_stream: &LiveStream) -> bool {
        self.backend.teletext().has_teletext(live_stream).await
    }

    async fn start_grabbing_teletext(&self, live_stream: &LiveStream) {
        self.backend
            .teletext()
            .start_grabbing_teletext(live_stream)
            .await
    }

    async fn stop_grabbing_teletext(&self, live_stream: &LiveStream) {
        self.backend
            .teletext()
            .stop_grabbing_teletext(live_stream)
            .await
    }

    async fn is_grabbing_teletext(&self, live_stream: &LiveStream) -> bool {
        self.backend.teletext().is_grabbing_teletext(live_stream).await
    }

    async fn get_teletext_page_bytes(
        &self,
        live_stream: &LiveStream,
        page_number: u32,
        sub_page_number: u32,
    ) -> Option<TeletextPage> {
        self.backend
            .teletext()
            .get_teletext_page_bytes(live_stream, page_number, sub_page_number)
            .await
    }
}
