//! # Socket-backed connections.
//!
//! [`RpcConnector`] opens TCP or local sockets and frames them with a
//! length-delimited codec; each frame carries one JSON document. A call is one request
//! frame followed by one response frame.
//!
//! Any failure during a call (I/O, codec, timeout) leaves the stream position unknown,
//! so the connection is marked `Faulted` and the proxy replaces it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::config::NodeConfig;
use crate::error::ChannelError;
use crate::transport::{AtomicChannelState, ChannelState, Connection, Connector, Endpoint};

/// Byte stream a connection can run over.
pub(crate) trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Io for T {}

/// Codec shared by the client and server side.
pub(crate) fn frame_codec(max_frame_len: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_len)
        .new_codec()
}

/// Applies an optional bound to `fut`.
pub(crate) async fn bounded<T>(
    bound: Option<Duration>,
    fut: impl Future<Output = Result<T, ChannelError>>,
) -> Result<T, ChannelError> {
    match bound {
        Some(limit) => time::timeout(limit, fut)
            .await
            .unwrap_or(Err(ChannelError::Timeout(limit))),
        None => fut.await,
    }
}

type FramedIo = Framed<Box<dyn Io>, LengthDelimitedCodec>;

/// A framed request/response connection.
pub struct RpcConnection {
    endpoint: Endpoint,
    io: Mutex<Option<FramedIo>>,
    state: AtomicChannelState,
    call_timeout: Option<Duration>,
}

impl RpcConnection {
    fn new(endpoint: Endpoint, io: Box<dyn Io>, max_frame_len: usize, call_timeout: Option<Duration>) -> Self {
        Self {
            endpoint,
            io: Mutex::new(Some(Framed::new(io, frame_codec(max_frame_len)))),
            state: AtomicChannelState::new(ChannelState::Opened),
            call_timeout,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn exchange(framed: &mut FramedIo, request: Bytes) -> Result<serde_json::Value, ChannelError> {
        framed.send(request).await?;
        match framed.next().await {
            Some(Ok(frame)) => Ok(serde_json::from_slice(&frame)?),
            Some(Err(err)) => Err(err.into()),
            None => Err(ChannelError::Closed),
        }
    }
}

#[async_trait]
impl Connection for RpcConnection {
    fn state(&self) -> ChannelState {
        self.state.load()
    }

    async fn call(&self, request: serde_json::Value) -> Result<serde_json::Value, ChannelError> {
        match self.state.load() {
            ChannelState::Opened => {}
            ChannelState::Faulted => return Err(ChannelError::Faulted),
            ChannelState::Closed => return Err(ChannelError::Closed),
        }
        let payload = Bytes::from(serde_json::to_vec(&request)?);

        let mut guard = self.io.lock().await;
        let framed = guard.as_mut().ok_or(ChannelError::Closed)?;
        let result = bounded(self.call_timeout, Self::exchange(framed, payload)).await;
        if result.is_err() {
            self.state.degrade(ChannelState::Faulted);
        }
        result
    }

    async fn close(&self) -> Result<(), ChannelError> {
        let mut guard = self.io.lock().await;
        self.state.store(ChannelState::Closed);
        let Some(mut framed) = guard.take() else {
            return Ok(());
        };
        bounded(self.call_timeout, async move {
            SinkExt::<Bytes>::close(&mut framed)
                .await
                .map_err(ChannelError::from)
        })
        .await
    }

    fn abort(&self) {
        self.state.store(ChannelState::Closed);
        // a call in flight still owns the stream; it is dropped with the connection
        if let Ok(mut guard) = self.io.try_lock() {
            guard.take();
        }
    }
}

/// Opens [`RpcConnection`]s.
#[derive(Debug, Clone)]
pub struct RpcConnector {
    pipe_dir: PathBuf,
    max_frame_len: usize,
    call_timeout: Option<Duration>,
}

impl RpcConnector {
    pub fn from_config(cfg: &NodeConfig) -> Self {
        Self {
            pipe_dir: cfg.pipe_dir.clone(),
            max_frame_len: cfg.max_frame_len,
            call_timeout: cfg.call_timeout(),
        }
    }

    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Io>, ChannelError> {
        match endpoint {
            Endpoint::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            Endpoint::Local { interface } => {
                let path = self.pipe_dir.join(format!("{interface}.sock"));
                let stream = tokio::net::UnixStream::connect(path).await?;
                Ok(Box::new(stream))
            }
            #[cfg(not(unix))]
            Endpoint::Local { interface } => Err(ChannelError::Unsupported(format!(
                "local endpoint {interface} needs unix sockets"
            ))),
        }
    }
}

#[async_trait]
impl Connector for RpcConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Connection>, ChannelError> {
        let io = bounded(self.call_timeout, self.open(endpoint)).await?;
        Ok(Arc::new(RpcConnection::new(
            endpoint.clone(),
            io,
            self.max_frame_len,
            self.call_timeout,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    /// Echo server that answers every frame with `{"echo": <request>}`.
    async fn echo_server() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut framed = Framed::new(stream, frame_codec(1 << 20));
                    while let Some(Ok(frame)) = framed.next().await {
                        let req: serde_json::Value = serde_json::from_slice(&frame).unwrap();
                        let resp = serde_json::to_vec(&json!({ "echo": req })).unwrap();
                        if framed.send(Bytes::from(resp)).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        addr
    }

    fn connector(call_timeout: Option<Duration>) -> RpcConnector {
        RpcConnector {
            pipe_dir: std::env::temp_dir(),
            max_frame_len: 1 << 20,
            call_timeout,
        }
    }

    #[tokio::test]
    async fn call_round_trips_over_tcp() {
        let addr = echo_server().await;
        let conn = connector(Some(Duration::from_secs(2)))
            .connect(&Endpoint::tcp("127.0.0.1", addr.port()))
            .await
            .unwrap();

        let resp = conn.call(json!({ "op": "ping" })).await.unwrap();
        assert_eq!(resp, json!({ "echo": { "op": "ping" } }));
        assert_eq!(conn.state(), ChannelState::Opened);

        conn.close().await.unwrap();
        assert_eq!(conn.state(), ChannelState::Closed);
        assert!(matches!(conn.call(json!(1)).await, Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn silent_peer_faults_the_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let conn = connector(Some(Duration::from_millis(50)))
            .connect(&Endpoint::tcp("127.0.0.1", port))
            .await
            .unwrap();
        let err = conn.call(json!({ "op": "ping" })).await.unwrap_err();
        assert!(matches!(err, ChannelError::Timeout(_)));
        assert_eq!(conn.state(), ChannelState::Faulted);
        assert!(matches!(conn.call(json!(1)).await, Err(ChannelError::Faulted)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn local_endpoint_uses_the_pipe_dir() {
        let dir = tempfile::tempdir().unwrap();
        let listener = tokio::net::UnixListener::bind(dir.path().join("Echo.sock")).unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, frame_codec(1 << 20));
            if let Some(Ok(frame)) = framed.next().await {
                framed.send(frame.freeze()).await.unwrap();
            }
        });

        let connector = RpcConnector {
            pipe_dir: dir.path().to_path_buf(),
            max_frame_len: 1 << 20,
            call_timeout: Some(Duration::from_secs(2)),
        };
        let conn = connector.connect(&Endpoint::local("Echo")).await.unwrap();
        assert_eq!(conn.call(json!([1, 2, 3])).await.unwrap(), json!([1, 2, 3]));
    }
}
