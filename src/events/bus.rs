//! # Broadcast bus for render and queue events.
//!
//! Every [`Template`](crate::Template), render pipeline and
//! [`WorkQueue`](crate::WorkQueue) built from the same
//! [`Services`](crate::Services) publishes into one [`Bus`].
//!
//! ```text
//! Template ─┐
//! render   ─┼─► Bus (ring buffer) ─┬─► subscriber_listener ─► SubscriberSet
//! WorkQueue─┘                      └─► ad-hoc receivers (tests, hosts)
//! ```
//!
//! ## Rules
//! - `publish` never waits; with no receiver the event is simply lost.
//! - The ring buffer is shared: a receiver that falls `capacity` events behind
//!   sees `RecvError::Lagged` and resumes at the oldest retained event.

use tokio::sync::broadcast;

use super::event::Event;

/// Default ring buffer size.
const DEFAULT_CAPACITY: usize = 1024;

/// Cloneable handle to the event channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus retaining up to `capacity` events (at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Sends `ev` to every current receiver.
    pub fn publish(&self, ev: Event) {
        // Err only means nobody is listening.
        let _ = self.tx.send(ev);
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_see_events_published_after_subscribing() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::WorkQueued));
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::WorkStarted).with_work(9));
        let ev = rx.recv().await.expect("event delivered");
        assert_eq!(ev.kind, EventKind::WorkStarted);
        assert_eq!(ev.work, Some(9));
        assert_eq!(bus.receiver_count(), 1);
    }
}
