//! # Example: loopback
//!
//! Runs a recorder node and a toy scheduling peer in one process.
//!
//! Shows how to:
//! - Implement [`CaptureBackend`] for a device.
//! - Serve the command surface with [`NodeHost`].
//! - Drive it from the peer side with [`TunerClient`].
//!
//! ## Flow
//! ```text
//! peer ── initialize ──► node ── register_recorder_tuner ──► peer callback (ack)
//! peer ── allocate_card / start_recording ──► node ──► capture unit (3s window)
//! peer ── validate_and_update_recording (+2s) ──► window extended
//! window ends ──► Stopping ──► Stopped ──► removed
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example loopback
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use tunervisor::transport::RpcConnector;
use tunervisor::transport::wire::{
    CallbackRequest, CallbackResponse, StartRecording, TunerRequest, TunerResponse,
};
use tunervisor::{
    Allocation, Bus, CaptureBackend, CaptureError, Channel, ChannelProxy, Endpoint, NodeConfig,
    NodeHost, RecorderNode, SessionRecord, TunerClient, UpcomingProgram,
};

/// Pretends to write a transport stream.
struct DummyCard;

#[async_trait]
impl CaptureBackend for DummyCard {
    fn name(&self) -> &str {
        "dummy"
    }

    async fn allocate_card(&self, _: &Channel, allocations: &[Allocation], _: bool) -> Option<String> {
        (tunervisor::allocation::count_allocated(allocations, "dummy0") == 0)
            .then(|| "dummy0".to_string())
    }

    async fn start_capture(
        &self,
        record: &SessionRecord,
        ctx: &CancellationToken,
    ) -> Result<(), CaptureError> {
        tokio::select! {
            _ = ctx.cancelled() => Err(CaptureError::Canceled),
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                println!("[card] writing {}.ts", record.file_base());
                Ok(())
            }
        }
    }

    async fn stop_capture(&self, record: &SessionRecord) -> Result<(), CaptureError> {
        println!("[card] closed {}.ts", record.file_base());
        Ok(())
    }

    fn recording_shares(&self) -> Vec<String> {
        vec!["/tmp/recordings".into()]
    }
}

/// Peer callback endpoint: acknowledges every registration.
async fn callback_endpoint() -> Result<u16, Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
                while let Some(Ok(frame)) = framed.next().await {
                    let reply = match serde_json::from_slice::<CallbackRequest>(&frame) {
                        Ok(CallbackRequest::RegisterRecorderTuner { name, version, .. }) => {
                            println!("[peer] node {name} v{version} registered");
                            CallbackResponse::Ack
                        }
                        Err(err) => CallbackResponse::Error(err.to_string()),
                    };
                    let Ok(bytes) = serde_json::to_vec(&reply) else { break };
                    if framed.send(Bytes::from(bytes)).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    Ok(port)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let pipes = tempfile::tempdir()?;
    let cfg = NodeConfig {
        name: "loopback-node".into(),
        tcp_port: 0,
        pipe_dir: pipes.path().to_path_buf(),
        stop_grace: Duration::from_secs(1),
        ..NodeConfig::default()
    };

    let node = RecorderNode::builder(cfg.clone(), Arc::new(DummyCard)).build();
    let host = NodeHost::bind(&cfg, node.clone()).await?;
    let node_port = host.local_addr()?.port();
    let token = CancellationToken::new();
    let server = tokio::spawn(host.serve(token.clone()));

    let peer_port = callback_endpoint().await?;
    let client = TunerClient::new(Arc::new(ChannelProxy::new(
        Endpoint::tcp("127.0.0.1", node_port),
        Arc::new(RpcConnector::from_config(&cfg)),
        Bus::new(16),
    )));

    println!("[peer] node speaks api v{}", client.ping().await?);
    client
        .call(TunerRequest::Initialize {
            node_id: Uuid::new_v4(),
            server_host: "127.0.0.1".into(),
            tcp_port: peer_port,
        })
        .await?;

    let now = Utc::now();
    let channel = Channel::new(Uuid::new_v4(), "Loopback One");
    let program = UpcomingProgram {
        upcoming_program_id: Uuid::new_v4(),
        title: "Evening News".into(),
        episode: None,
        channel: channel.clone(),
        start_time_utc: now,
        stop_time_utc: now + ChronoDuration::seconds(3),
        pre_record_seconds: 0,
        post_record_seconds: 0,
    };

    let card = match client
        .call(TunerRequest::AllocateCard {
            channel: channel.clone(),
            allocations: Vec::new(),
            use_reverse_priority: false,
        })
        .await?
    {
        TunerResponse::Card(Some(card)) => card,
        other => return Err(format!("no card: {other:?}").into()),
    };
    let allocation = Allocation::new(card, channel.channel_id);

    let started = client
        .call(TunerRequest::StartRecording(StartRecording {
            server_host: "127.0.0.1".into(),
            tcp_port: peer_port,
            allocation: allocation.clone(),
            start_time_utc: program.start_time_utc,
            stop_time_utc: program.stop_time_utc,
            program: program.clone(),
            suggested_base_file_name: "evening-news".into(),
        }))
        .await?;
    println!("[peer] start_recording -> {started:?}");

    tokio::time::sleep(Duration::from_secs(1)).await;
    let extended = client
        .call(TunerRequest::ValidateAndUpdateRecording {
            allocation,
            program: program.clone(),
            stop_time_utc: program.stop_time_utc + ChronoDuration::seconds(2),
        })
        .await?;
    println!("[peer] validate_and_update_recording -> {extended:?}");

    while !node.registry().is_empty().await {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    println!("[peer] recording finished");

    client.close().await?;
    token.cancel();
    server.await?;
    let report = node.shutdown().await;
    println!("[node] shutdown clean: {}", report.is_clean());
    Ok(())
}
