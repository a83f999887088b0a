//! # Event bus.
//!
//! [`Bus`] carries every lifecycle [`Event`] of a node from its publishers (session
//! registry, capture monitors, the command façade, channel proxies) to the single node
//! listener that feeds the subscriber set.
//!
//! Publishing never waits. The ring buffer is shared by all receivers; a receiver
//! that falls behind gets `RecvError::Lagged(n)` and loses the `n` oldest events.
//! Events published while nobody is subscribed are dropped.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable handle to the node's event channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn subscriber_sees_events_published_after_subscribe() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::SessionAdded));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::SessionRemoved).with_session("s"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::SessionRemoved);
        assert_eq!(ev.session.as_deref(), Some("s"));
    }
}
