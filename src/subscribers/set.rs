//! # Fan-out of bus events to subscribers.
//!
//! [`SubscriberSet`] gives each [`Subscribe`] implementor its own bounded
//! queue and worker task, so a slow subscriber only delays itself.
//!
//! ```text
//! emit(ev) ──try_send──► lane "log"     ──► worker ──► on_event
//!          ──try_send──► lane "metrics" ──► worker ──► on_event
//!                 │ full / closed                        │ panic
//!                 ▼                                      ▼
//!        SubscriberOverflow (bus)             SubscriberPanicked (bus)
//! ```
//!
//! ## Rules
//! - Each subscriber sees events in emission order; there is no ordering
//!   across subscribers.
//! - `emit` never waits. A full lane drops the event for that subscriber only.
//! - An overflow notice that itself overflows is not re-published.
//! - A panic in `on_event` is reported and the worker keeps going.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::error::RenderError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

/// Queue feeding one subscriber's worker.
struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Set of subscribers, each behind its own worker.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

/// Drains `rx` into `sub`, reporting panics on `bus`.
async fn drive(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let delivered = AssertUnwindSafe(sub.on_event(&ev)).catch_unwind().await;
        if let Err(payload) = delivered {
            let info = match RenderError::from_panic(payload) {
                RenderError::Panicked { error } => error,
                other => other.as_message(),
            };
            bus.publish(Event::subscriber_panicked(sub.name(), info));
        }
    }
}

impl SubscriberSet {
    /// Spawns one worker per subscriber; requires a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let (lanes, workers) = subs
            .into_iter()
            .map(|sub| {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let lane = Lane { name: sub.name(), tx };
                (lane, tokio::spawn(drive(sub, rx, bus.clone())))
            })
            .unzip();
        Self { lanes, workers, bus }
    }

    /// Queues a copy of `event` for every subscriber.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Queues `event` for every subscriber without copying it.
    pub fn emit_arc(&self, event: Arc<Event>) {
        let overflow_notice = event.kind == EventKind::SubscriberOverflow;
        for lane in &self.lanes {
            let reason = match lane.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "full",
                Err(TrySendError::Closed(_)) => "closed",
            };
            if !overflow_notice {
                self.bus.publish(Event::subscriber_overflow(lane.name, reason));
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Closes every lane and waits for the workers to drain what is queued.
    pub async fn shutdown(self) {
        drop(self.lanes);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}
