//! # Fan-out of bus events to subscribers.
//!
//! Every subscriber gets its own bounded lane and worker task, so a slow log sink
//! never delays a capture monitor or a command handler that publishes.
//!
//! ```text
//! emit(event) ── try_send ──► lane "log"    ──► worker ──► LogWriter::on_event
//!             ── try_send ──► lane "custom" ──► worker ──► Custom::on_event
//!                   │                                  └─ panic → SubscriberPanicked
//!                   └─ lane full / closed → SubscriberOverflow (event dropped for that lane)
//! ```
//!
//! Each lane is FIFO. There is no ordering across lanes.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
    worker: JoinHandle<()>,
}

impl Lane {
    fn open(sub: Arc<dyn Subscribe>, bus: Bus) -> Self {
        let name = sub.name();
        let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
        let worker = tokio::spawn(drive(sub, rx, bus));
        Self { name, tx, worker }
    }
}

/// Delivers queued events to one subscriber until its lane closes.
async fn drive(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        // a subscriber holding a lock across the panic may leave it poisoned
        let Err(payload) = AssertUnwindSafe(sub.on_event(&ev)).catch_unwind().await else {
            continue;
        };
        let info = panic_message(payload.as_ref());
        tracing::warn!(subscriber = sub.name(), %info, "subscriber panicked");
        if !ev.is_subscriber_internal() {
            bus.publish(Event::subscriber_panicked(sub.name(), info));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Per-subscriber queues over the node's event stream.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    bus: Bus,
}

impl SubscriberSet {
    /// Opens one lane per subscriber. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let lanes = subs
            .into_iter()
            .map(|sub| Lane::open(sub, bus.clone()))
            .collect();
        Self { lanes, bus }
    }

    /// Queues `event` on every lane without waiting.
    pub fn emit(&self, event: &Event) {
        let shared = Arc::new(event.clone());
        for lane in &self.lanes {
            let reason = match lane.tx.try_send(Arc::clone(&shared)) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "full",
                Err(TrySendError::Closed(_)) => "closed",
            };
            tracing::warn!(subscriber = lane.name, reason, "subscriber dropped event");
            // overflow notices about overflow notices would loop
            if !shared.is_subscriber_internal() {
                self.bus.publish(Event::subscriber_overflow(lane.name, reason));
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    /// Closes every lane and waits until queued events are delivered.
    pub async fn shutdown(self) {
        let workers: Vec<_> = self
            .lanes
            .into_iter()
            .map(|Lane { worker, .. }| worker)
            .collect();
        for worker in workers {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Collect {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().unwrap().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "collect"
        }
    }

    struct Explode;

    #[async_trait]
    impl Subscribe for Explode {
        async fn on_event(&self, _ev: &Event) {
            panic!("boom");
        }
        fn name(&self) -> &'static str {
            "explode"
        }
    }

    /// Never finishes an event, so its one-slot lane fills up.
    struct Stuck;

    #[async_trait]
    impl Subscribe for Stuck {
        async fn on_event(&self, _ev: &Event) {
            std::future::pending::<()>().await;
        }
        fn name(&self) -> &'static str {
            "stuck"
        }
        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn fans_out_in_order_and_isolates_panics() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let collect = Arc::new(Collect::default());
        let set = SubscriberSet::new(vec![collect.clone(), Arc::new(Explode)], bus);
        assert_eq!(set.len(), 2);

        set.emit(&Event::new(EventKind::SessionAdded));
        set.emit(&Event::new(EventKind::SessionActive));
        set.shutdown().await;

        assert_eq!(
            *collect.0.lock().unwrap(),
            vec![EventKind::SessionAdded, EventKind::SessionActive]
        );
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::SubscriberPanicked);
        assert_eq!(ev.reason.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn full_lane_reports_overflow() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Stuck) as Arc<dyn Subscribe>], bus);

        // first is taken by the worker, second fills the slot, third overflows
        for _ in 0..3 {
            set.emit(&Event::new(EventKind::SessionAdded));
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::SubscriberOverflow);
    }
}
