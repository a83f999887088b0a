//! # Serving the command surface.
//!
//! [`NodeHost`] exposes a [`TunerService`] on a TCP port and, on unix, on the local
//! socket `<pipe_dir>/RecorderTunerService.sock`. Both endpoints speak the same framed
//! JSON protocol and dispatch through [`dispatch`].
//!
//! ```text
//! NodeHost::bind(cfg, service)
//!   └─► serve(token)
//!         ├─ accept loop (tcp)   ──► connection task ──► dispatch(service, request)
//!         ├─ accept loop (local) ──► connection task ──► dispatch(service, request)
//!         └─ token cancelled → stop accepting → cancel connection tasks → join
//! run_until_signal()
//!   └─► serve until SIGINT/SIGTERM/SIGQUIT → node.shutdown()
//! ```
//!
//! [`TunerClient`] is the peer side of the same protocol.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::error::{ChannelError, NodeError};
use crate::service::{RecorderNode, TunerService};
use crate::supervisor::{ShutdownReport, wait_for_shutdown_signal};
use crate::transport::rpc::{Io, frame_codec};
use crate::transport::wire::{TunerRequest, TunerResponse};
use crate::transport::{ChannelProxy, interfaces};

/// Routes one request to the matching [`TunerService`] method.
pub async fn dispatch(service: &dyn TunerService, request: TunerRequest) -> TunerResponse {
    use TunerRequest as R;
    use TunerResponse as A;

    match request {
        R::Ping => A::Version(service.ping().await),
        R::Initialize {
            node_id,
            server_host,
            tcp_port,
        } => {
            service.initialize(node_id, &server_host, tcp_port).await;
            A::Done
        }
        R::AllocateCard {
            channel,
            allocations,
            use_reverse_priority,
        } => A::Card(
            service
                .allocate_card(&channel, &allocations, use_reverse_priority)
                .await,
        ),
        R::StartRecording(args) => A::Bool(service.start_recording(args).await),
        R::ValidateAndUpdateRecording {
            allocation,
            program,
            stop_time_utc,
        } => A::Bool(
            service
                .validate_and_update_recording(&allocation, &program, stop_time_utc)
                .await,
        ),
        R::AbortRecording {
            server_host,
            tcp_port,
            program,
        } => A::Bool(service.abort_recording(&server_host, tcp_port, &program).await),
        R::GetRecordingShares => A::Shares(service.get_recording_shares().await),
        R::GetTimeshiftShares => A::Shares(service.get_timeshift_shares().await),
        R::TuneLiveStream {
            channel,
            upcoming_allocation,
            live_stream,
        } => {
            let (result, live_stream) = service
                .tune_live_stream(&channel, upcoming_allocation.as_ref(), live_stream)
                .await;
            A::LiveTune {
                result,
                live_stream,
            }
        }
        R::StopLiveStream { live_stream } => {
            service.stop_live_stream(&live_stream).await;
            A::Done
        }
        R::GetLiveStreams => A::LiveStreams(service.get_live_streams().await),
        R::KeepLiveStreamAlive { live_stream } => {
            A::Bool(service.keep_live_stream_alive(&live_stream).await)
        }
        R::GetChannelsLiveState {
            channels,
            live_stream,
        } => A::LiveStates(
            service
                .get_channels_live_state(&channels, live_stream.as_ref())
                .await,
        ),
        R::GetLiveStreamTuningDetails { live_stream } => {
            A::Tuning(service.get_live_stream_tuning_details(&live_stream).await)
        }
        R::HasTeletext { live_stream } => A::Bool(service.has_teletext(&live_stream).await),
        R::StartGrabbingTeletext { live_stream } => {
            service.start_grabbing_teletext(&live_stream).await;
            A::Done
        }
        R::StopGrabbingTeletext { live_stream } => {
            service.stop_grabbing_teletext(&live_stream).await;
            A::Done
        }
        R::IsGrabbingTeletext { live_stream } => {
            A::Bool(service.is_grabbing_teletext(&live_stream).await)
        }
        R::GetTeletextPageBytes {
            live_stream,
            page_number,
            sub_page_number,
        } => A::Teletext(
            service
                .get_teletext_page_bytes(&live_stream, page_number, sub_page_number)
                .await,
        ),
    }
}

/// Listening endpoints of a node.
pub struct NodeHost {
    service: Arc<dyn TunerService>,
    tcp: TcpListener,
    local: LocalEndpoint,
    max_frame_len: usize,
    call_timeout: Option<Duration>,
}

impl NodeHost {
    /// Binds the TCP port and the local socket.
    ///
    /// A failure to bind the local socket is logged and leaves only TCP.
    pub async fn bind(cfg: &NodeConfig, service: Arc<dyn TunerService>) -> Result<Self, ChannelError> {
        let tcp = TcpListener::bind(("0.0.0.0", cfg.tcp_port)).await?;
        tracing::info!(addr = %tcp.local_addr()?, "command surface listening (tcp)");

        Ok(Self {
            service,
            tcp,
            local: LocalEndpoint::bind(cfg.pipe_path(interfaces::RECORDER_TUNER)),
            max_frame_len: cfg.max_frame_len,
            call_timeout: cfg.call_timeout(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ChannelError> {
        Ok(self.tcp.local_addr()?)
    }

    /// Path of the local socket, when one is bound.
    pub fn local_path(&self) -> Option<&Path> {
        self.local.path()
    }

    /// Serves until `token` is cancelled, then waits for open connections to finish.
    pub async fn serve(self, token: CancellationToken) {
        let mut conns = JoinSet::new();
        let conn_token = token.child_token();

        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                accepted = self.tcp.accept() => accepted.map(|(stream, peer)| {
                    let _ = stream.set_nodelay(true);
                    tracing::debug!(%peer, "peer connected (tcp)");
                    Box::new(stream) as Box<dyn Io>
                }),
                accepted = self.local.accept() => accepted,
                Some(_) = conns.join_next(), if !conns.is_empty() => continue,
            };
            match accepted {
                Ok(io) => {
                    conns.spawn(serve_connection(
                        io,
                        Arc::clone(&self.service),
                        self.max_frame_len,
                        self.call_timeout,
                        conn_token.clone(),
                    ));
                }
                Err(err) => tracing::warn!(error = %err, "accept failed"),
            }
        }

        conn_token.cancel();
        while conns.join_next().await.is_some() {}
        self.local.remove();
        tracing::info!("command surface stopped");
    }

    /// Serves until a termination signal arrives, then shuts `node` down.
    pub async fn run_until_signal(self, node: Arc<RecorderNode>) -> ShutdownReport {
        let token = CancellationToken::new();
        let server = tokio::spawn(self.serve(token.clone()));

        if let Err(err) = wait_for_shutdown_signal().await {
            tracing::error!(error = %err, "cannot listen for termination signals; shutting down");
        }
        token.cancel();
        let _ = server.await;
        node.shutdown().await
    }
}

/// Same-host endpoint; never accepts where unix sockets are unavailable.
struct LocalEndpoint {
    #[cfg(unix)]
    bound: Option<(tokio::net::UnixListener, PathBuf)>,
}

impl LocalEndpoint {
    #[cfg(unix)]
    fn bind(path: PathBuf) -> Self {
        let bound = (|| {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            // a socket file left by a previous run blocks bind
            match std::fs::remove_file(&path) {
                Err(err) if err.kind() != std::io::ErrorKind::NotFound => return Err(err),
                _ => {}
            }
            tokio::net::UnixListener::bind(&path)
        })();
        match bound {
            Ok(listener) => {
                tracing::info!(path = %path.display(), "command surface listening (local)");
                Self {
                    bound: Some((listener, path)),
                }
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "local endpoint unavailable");
                Self { bound: None }
            }
        }
    }

    #[cfg(not(unix))]
    fn bind(path: PathBuf) -> Self {
        tracing::warn!(path = %path.display(), "local endpoint needs unix sockets");
        Self {}
    }

    async fn accept(&self) -> std::io::Result<Box<dyn Io>> {
        #[cfg(unix)]
        {
            if let Some((listener, _)) = &self.bound {
                let (stream, _) = listener.accept().await?;
                return Ok(Box::new(stream));
            }
        }
        std::future::pending().await
    }

    fn path(&self) -> Option<&Path> {
        #[cfg(unix)]
        {
            if let Some((_, path)) = &self.bound {
                return Some(path.as_path());
            }
        }
        None
    }

    fn remove(&self) {
        if let Some(path) = self.path() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Answers requests on one connection until the peer leaves or `token` fires.
async fn serve_connection(
    io: Box<dyn Io>,
    service: Arc<dyn TunerService>,
    max_frame_len: usize,
    call_timeout: Option<Duration>,
    token: CancellationToken,
) {
    let mut framed = Framed::new(io, frame_codec(max_frame_len));
    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => break,
            frame = framed.next() => frame,
        };
        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                tracing::warn!(error = %err, "dropping connection: bad frame");
                break;
            }
            None => break,
        };

        let response = match serde_json::from_slice::<TunerRequest>(&frame) {
            Ok(request) => {
                let op = request.op();
                tracing::debug!(op, "command");
                let handled = dispatch(service.as_ref(), request);
                match call_timeout {
                    Some(limit) => time::timeout(limit, handled)
                        .await
                        .unwrap_or_else(|_| TunerResponse::Error(format!("{op} timed out after {limit:?}"))),
                    None => handled.await,
                }
            }
            Err(err) => TunerResponse::Error(format!("undecodable request: {err}")),
        };

        let payload = match serde_json::to_vec(&response) {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                tracing::error!(error = %err, "cannot encode response");
                break;
            }
        };
        if let Err(err) = framed.send(payload).await {
            tracing::debug!(error = %err, "peer went away");
            break;
        }
    }
}

/// Peer-side client of the command surface.
pub struct TunerClient {
    proxy: Arc<ChannelProxy>,
}

impl TunerClient {
    pub fn new(proxy: Arc<ChannelProxy>) -> Self {
        Self { proxy }
    }

    /// Sends one command and decodes the answer.
    pub async fn call(&self, request: TunerRequest) -> Result<TunerResponse, NodeError> {
        let unavailable = |source: ChannelError| NodeError::ConnectionUnavailable {
            endpoint: self.proxy.endpoint().to_string(),
            source,
        };
        let value = serde_json::to_value(&request).map_err(|e| unavailable(e.into()))?;
        let reply = self.proxy.call(value).await?;
        match serde_json::from_value(reply).map_err(|e| unavailable(e.into()))? {
            TunerResponse::Error(msg) => Err(unavailable(ChannelError::Remote(msg))),
            other => Ok(other),
        }
    }

    pub async fn ping(&self) -> Result<i32, NodeError> {
        match self.call(TunerRequest::Ping).await? {
            TunerResponse::Version(v) => Ok(v),
            other => Err(NodeError::ConnectionUnavailable {
                endpoint: self.proxy.endpoint().to_string(),
                source: ChannelError::Remote(format!("unexpected answer to ping: {other:?}")),
            }),
        }
    }

    pub async fn close(&self) -> Result<(), ChannelError> {
        self.proxy.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CaptureBackend;
    use crate::error::CaptureError;
    use crate::events::Bus;
    use crate::model::{Allocation, Channel, RECORDER_API_VERSION};
    use crate::session::SessionRecord;
    use crate::transport::{Connector, Endpoint, RpcConnector};
    use async_trait::async_trait;
    use serde_json::json;
    use uuid::Uuid;

    struct Idle;

    #[async_trait]
    impl CaptureBackend for Idle {
        fn name(&self) -> &str {
            "idle"
        }

        async fn allocate_card(&self, _: &Channel, _: &[Allocation], _: bool) -> Option<String> {
            Some("A".to_string())
        }

        async fn start_capture(&self, _: &SessionRecord, _: &CancellationToken) -> Result<(), CaptureError> {
            Ok(())
        }

        async fn stop_capture(&self, _: &SessionRecord) -> Result<(), CaptureError> {
            Ok(())
        }

        fn recording_shares(&self) -> Vec<String> {
            vec!["/srv/recordings".to_string()]
        }
    }

    struct Running {
        cfg: NodeConfig,
        port: u16,
        token: CancellationToken,
        server: tokio::task::JoinHandle<()>,
        _dir: tempfile::TempDir,
    }

    async fn running_host() -> Running {
        let dir = tempfile::tempdir().unwrap();
        let cfg = NodeConfig {
            tcp_port: 0,
            pipe_dir: dir.path().to_path_buf(),
            call_timeout: Duration::from_secs(2),
            ..NodeConfig::default()
        };
        let node = RecorderNode::builder(cfg.clone(), Arc::new(Idle))
            .with_subscribers(Vec::new())
            .build();
        let host = NodeHost::bind(&cfg, node).await.unwrap();
        let port = host.local_addr().unwrap().port();
        let token = CancellationToken::new();
        let server = tokio::spawn(host.serve(token.clone()));
        Running {
            cfg,
            port,
            token,
            server,
            _dir: dir,
        }
    }

    fn client(cfg: &NodeConfig, endpoint: Endpoint) -> TunerClient {
        let connector = Arc::new(RpcConnector::from_config(cfg)) as Arc<dyn Connector>;
        TunerClient::new(Arc::new(ChannelProxy::new(endpoint, connector, Bus::new(8))))
    }

    #[tokio::test]
    async fn commands_round_trip_over_tcp() {
        let host = running_host().await;
        let client = client(&host.cfg, Endpoint::tcp("127.0.0.1", host.port));

        assert_eq!(client.ping().await.unwrap(), RECORDER_API_VERSION);
        let card = client
            .call(TunerRequest::AllocateCard {
                channel: Channel::new(Uuid::nil(), "One"),
                allocations: Vec::new(),
                use_reverse_priority: false,
            })
            .await
            .unwrap();
        assert_eq!(card, TunerResponse::Card(Some("A".into())));

        client.close().await.unwrap();
        host.token.cancel();
        host.server.await.unwrap();
    }

    #[tokio::test]
    async fn undecodable_request_gets_an_error_answer() {
        let host = running_host().await;
        let conn = RpcConnector::from_config(&host.cfg)
            .connect(&Endpoint::tcp("127.0.0.1", host.port))
            .await
            .unwrap();

        let reply = conn.call(json!({ "op": "format_disk" })).await.unwrap();
        assert_eq!(reply["kind"], "error");

        // the connection stays usable
        let reply = conn.call(json!({ "op": "ping" })).await.unwrap();
        assert_eq!(reply, json!({ "kind": "version", "value": RECORDER_API_VERSION }));

        host.token.cancel();
        host.server.await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn local_socket_serves_and_is_removed_on_stop() {
        let host = running_host().await;
        let path = host.cfg.pipe_path(interfaces::RECORDER_TUNER);
        assert!(path.exists());

        let client = client(&host.cfg, Endpoint::local(interfaces::RECORDER_TUNER));
        assert_eq!(
            client.call(TunerRequest::GetRecordingShares).await.unwrap(),
            TunerResponse::Shares(vec!["/srv/recordings".into()])
        );

        host.token.cancel();
        host.server.await.unwrap();
        assert!(!path.exists());
    }
}
