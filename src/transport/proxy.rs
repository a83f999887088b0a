//! # Cached channel per endpoint.
//!
//! [`ChannelProxy`] hands out one shared connection to an endpoint and rebuilds it
//! when it faults. [`ProxyRegistry`] keeps one proxy per endpoint for the lifetime of
//! the node.
//!
//! ## Rules
//! - Check and create happen under one lock: concurrent first calls open **one** connection
//! - A faulted connection is aborted and replaced on the next `get_connection`
//! - `close` is idempotent and always leaves the slot empty:
//!   - faulted → abort
//!   - graceful close fails with a communication error → abort, `Ok`
//!   - graceful close fails otherwise → abort, error returned
//! - The registry lock and a proxy's slot lock are never held together

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{ChannelError, NodeError};
use crate::events::{Bus, Event, EventKind};
use crate::transport::{ChannelState, Connection, Connector, Endpoint};

/// Lazily-connected, self-healing channel to one endpoint.
pub struct ChannelProxy {
    endpoint: Endpoint,
    connector: Arc<dyn Connector>,
    slot: Mutex<Option<Arc<dyn Connection>>>,
    bus: Bus,
}

impl ChannelProxy {
    pub fn new(endpoint: Endpoint, connector: Arc<dyn Connector>, bus: Bus) -> Self {
        Self {
            endpoint,
            connector,
            slot: Mutex::new(None),
            bus,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the cached connection, opening a new one if absent or faulted.
    pub async fn get_connection(&self) -> Result<Arc<dyn Connection>, NodeError> {
        let mut slot = self.slot.lock().await;

        if let Some(conn) = slot.as_ref() {
            if conn.state() == ChannelState::Opened {
                return Ok(Arc::clone(conn));
            }
            conn.abort();
            *slot = None;
            self.publish(EventKind::ChannelAborted);
        }

        let conn = self
            .connector
            .connect(&self.endpoint)
            .await
            .map_err(|source| NodeError::ConnectionUnavailable {
                endpoint: self.endpoint.to_string(),
                source,
            })?;
        *slot = Some(Arc::clone(&conn));
        self.publish(EventKind::ChannelOpened);
        Ok(conn)
    }

    /// Sends one request over the cached connection.
    pub async fn call(&self, request: serde_json::Value) -> Result<serde_json::Value, NodeError> {
        let conn = self.get_connection().await?;
        conn.call(request)
            .await
            .map_err(|source| NodeError::ConnectionUnavailable {
                endpoint: self.endpoint.to_string(),
                source,
            })
    }

    /// Tears the cached connection down. Calling it on an empty proxy is a no-op.
    pub async fn close(&self) -> Result<(), ChannelError> {
        let mut slot = self.slot.lock().await;
        let Some(conn) = slot.take() else {
            return Ok(());
        };

        if conn.state() == ChannelState::Faulted {
            conn.abort();
            self.publish(EventKind::ChannelAborted);
            return Ok(());
        }
        match conn.close().await {
            Ok(()) => {
                self.publish(EventKind::ChannelClosed);
                Ok(())
            }
            Err(err) if err.is_communication() => {
                conn.abort();
                self.publish(EventKind::ChannelAborted);
                Ok(())
            }
            Err(err) => {
                conn.abort();
                self.publish(EventKind::ChannelAborted);
                Err(err)
            }
        }
    }

    /// True if a connection is cached (in any state).
    pub async fn is_connected(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    fn publish(&self, kind: EventKind) {
        self.bus
            .publish(Event::new(kind).with_reason(self.endpoint.to_string()));
    }
}

/// One [`ChannelProxy`] per endpoint, shared by everything that talks to it.
pub struct ProxyRegistry {
    connector: Arc<dyn Connector>,
    proxies: Mutex<HashMap<Endpoint, Arc<ChannelProxy>>>,
    bus: Bus,
}

impl ProxyRegistry {
    pub fn new(connector: Arc<dyn Connector>, bus: Bus) -> Self {
        Self {
            connector,
            proxies: Mutex::new(HashMap::new()),
            bus,
        }
    }

    /// Returns the proxy for `endpoint`, creating it on first use.
    pub async fn proxy_for(&self, endpoint: &Endpoint) -> Arc<ChannelProxy> {
        let mut proxies = self.proxies.lock().await;
        let proxy = proxies.entry(endpoint.clone()).or_insert_with(|| {
            Arc::new(ChannelProxy::new(
                endpoint.clone(),
                Arc::clone(&self.connector),
                self.bus.clone(),
            ))
        });
        Arc::clone(proxy)
    }

    /// Closes and forgets every proxy. Close failures are logged.
    pub async fn close_all(&self) {
        let drained: Vec<Arc<ChannelProxy>> = {
            let mut proxies = self.proxies.lock().await;
            proxies.drain().map(|(_, p)| p).collect()
        };
        for proxy in drained {
            if let Err(err) = proxy.close().await {
                tracing::warn!(endpoint = %proxy.endpoint(), error = %err, "channel close failed");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::AtomicChannelState;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// What the fake connection's graceful close does.
    #[derive(Clone, Copy)]
    pub(crate) enum CloseBehavior {
        Clean,
        CommunicationError,
        OtherError,
    }

    pub(crate) struct FakeConnection {
        pub(crate) state: AtomicChannelState,
        pub(crate) closes: AtomicUsize,
        pub(crate) aborts: AtomicUsize,
        on_close: CloseBehavior,
        reply: serde_json::Value,
    }

    #[async_trait]
    impl Connection for FakeConnection {
        fn state(&self) -> ChannelState {
            self.state.load()
        }

        async fn call(&self, _request: serde_json::Value) -> Result<serde_json::Value, ChannelError> {
            Ok(self.reply.clone())
        }

        async fn close(&self) -> Result<(), ChannelError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.state.store(ChannelState::Closed);
            match self.on_close {
                CloseBehavior::Clean => Ok(()),
                CloseBehavior::CommunicationError => Err(ChannelError::Timeout(Duration::from_secs(1))),
                CloseBehavior::OtherError => Err(ChannelError::Remote("refused".into())),
            }
        }

        fn abort(&self) {
            self.aborts.fetch_add(1, Ordering::SeqCst);
            self.state.store(ChannelState::Closed);
        }
    }

    /// Counts connects; the connect itself takes a little while so callers overlap.
    pub(crate) struct FakeConnector {
        pub(crate) connects: AtomicUsize,
        pub(crate) made: std::sync::Mutex<Vec<Arc<FakeConnection>>>,
        pub(crate) on_close: CloseBehavior,
        pub(crate) reply: serde_json::Value,
        pub(crate) refuse: bool,
    }

    impl FakeConnector {
        pub(crate) fn new(on_close: CloseBehavior) -> Arc<Self> {
            Self::replying(on_close, serde_json::Value::Null)
        }

        pub(crate) fn replying(on_close: CloseBehavior, reply: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                connects: AtomicUsize::new(0),
                made: std::sync::Mutex::new(Vec::new()),
                on_close,
                reply,
                refuse: false,
            })
        }

        pub(crate) fn refusing() -> Arc<Self> {
            Arc::new(Self {
                connects: AtomicUsize::new(0),
                made: std::sync::Mutex::new(Vec::new()),
                on_close: CloseBehavior::Clean,
                reply: serde_json::Value::Null,
                refuse: true,
            })
        }

        pub(crate) fn last(&self) -> Arc<FakeConnection> {
            self.made.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, _endpoint: &Endpoint) -> Result<Arc<dyn Connection>, ChannelError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.refuse {
                return Err(ChannelError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                )));
            }
            let conn = Arc::new(FakeConnection {
                state: AtomicChannelState::new(ChannelState::Opened),
                closes: AtomicUsize::new(0),
                aborts: AtomicUsize::new(0),
                on_close: self.on_close,
                reply: self.reply.clone(),
            });
            self.made.lock().unwrap().push(Arc::clone(&conn));
            Ok(conn)
        }
    }

    fn proxy(connector: Arc<FakeConnector>) -> Arc<ChannelProxy> {
        Arc::new(ChannelProxy::new(
            Endpoint::tcp("sched", 49943),
            connector,
            Bus::new(64),
        ))
    }

    fn addr(conn: &Arc<dyn Connection>) -> *const () {
        Arc::as_ptr(conn) as *const ()
    }

    #[tokio::test]
    async fn concurrent_first_calls_share_one_connection() {
        let connector = FakeConnector::new(CloseBehavior::Clean);
        let proxy = proxy(connector.clone());

        let calls = (0..12).map(|_| {
            let proxy = proxy.clone();
            tokio::spawn(async move { proxy.get_connection().await.unwrap() })
        });
        let conns: Vec<_> = futures::future::join_all(calls)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        let first = addr(&conns[0]);
        assert!(conns.iter().all(|c| addr(c) == first));
    }

    #[tokio::test]
    async fn faulted_connection_is_replaced() {
        let connector = FakeConnector::new(CloseBehavior::Clean);
        let proxy = proxy(connector.clone());

        let first = proxy.get_connection().await.unwrap();
        connector.last().state.store(ChannelState::Faulted);

        let second = proxy.get_connection().await.unwrap();
        assert_ne!(addr(&first), addr(&second));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(first.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn close_twice_is_a_no_op() {
        let connector = FakeConnector::new(CloseBehavior::Clean);
        let proxy = proxy(connector.clone());
        proxy.get_connection().await.unwrap();

        proxy.close().await.unwrap();
        proxy.close().await.unwrap();

        let conn = connector.last();
        assert_eq!(conn.closes.load(Ordering::SeqCst), 1);
        assert_eq!(conn.aborts.load(Ordering::SeqCst), 0);
        assert!(!proxy.is_connected().await);
    }

    #[tokio::test]
    async fn close_on_fresh_proxy_is_a_no_op() {
        let connector = FakeConnector::new(CloseBehavior::Clean);
        let proxy = proxy(connector.clone());
        proxy.close().await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn faulted_close_aborts_without_graceful_attempt() {
        let connector = FakeConnector::new(CloseBehavior::Clean);
        let proxy = proxy(connector.clone());
        proxy.get_connection().await.unwrap();
        connector.last().state.store(ChannelState::Faulted);

        proxy.close().await.unwrap();
        let conn = connector.last();
        assert_eq!(conn.closes.load(Ordering::SeqCst), 0);
        assert_eq!(conn.aborts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn communication_error_on_close_is_swallowed() {
        let connector = FakeConnector::new(CloseBehavior::CommunicationError);
        let proxy = proxy(connector.clone());
        proxy.get_connection().await.unwrap();

        proxy.close().await.unwrap();
        assert_eq!(connector.last().aborts.load(Ordering::SeqCst), 1);
        assert!(!proxy.is_connected().await);
    }

    #[tokio::test]
    async fn other_close_error_aborts_and_propagates() {
        let connector = FakeConnector::new(CloseBehavior::OtherError);
        let proxy = proxy(connector.clone());
        proxy.get_connection().await.unwrap();

        let err = proxy.close().await.unwrap_err();
        assert!(matches!(err, ChannelError::Remote(_)));
        assert_eq!(connector.last().aborts.load(Ordering::SeqCst), 1);
        assert!(!proxy.is_connected().await);
        proxy.close().await.unwrap();
    }

    #[tokio::test]
    async fn refused_connect_surfaces_connection_unavailable() {
        let proxy = proxy(FakeConnector::refusing());
        let err = proxy.get_connection().await.err().unwrap();
        assert_eq!(err.as_label(), "connection_unavailable");
        assert!(!proxy.is_connected().await);
    }

    #[tokio::test]
    async fn registry_hands_out_one_proxy_per_endpoint() {
        let connector = FakeConnector::new(CloseBehavior::Clean);
        let reg = ProxyRegistry::new(connector.clone(), Bus::new(8));
        let a = reg.proxy_for(&Endpoint::tcp("sched", 1)).await;
        let b = reg.proxy_for(&Endpoint::tcp("sched", 1)).await;
        let c = reg.proxy_for(&Endpoint::tcp("sched", 2)).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        a.get_connection().await.unwrap();
        reg.close_all().await;
        assert!(!a.is_connected().await);
        assert_eq!(connector.last().closes.load(Ordering::SeqCst), 1);
    }
}
