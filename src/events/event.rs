//! # Runtime events emitted by templates and the work queue.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Strategy events**: compiled/interpreted selection and resets
//! - **Render events**: one render call from start to its terminal state
//! - **Recycling events**: reuse decisions for `render_item`
//! - **Queue events**: bounded work queue admission and completion
//!
//! The [`Event`] struct carries additional metadata such as timestamps,
//! template and node identities, reasons, and delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use bindery::events::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RenderFailed)
//!     .with_template(3)
//!     .with_reason("binding: boom");
//!
//! assert_eq!(ev.kind, EventKind::RenderFailed);
//! assert_eq!(ev.template, Some(3));
//! assert_eq!(ev.reason.as_deref(), Some("binding: boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `tag`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `tag`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Template / strategy events ===
    /// A template entity was constructed.
    ///
    /// Sets:
    /// - `template`: template id
    TemplateCreated,

    /// A render strategy was resolved and memoized.
    ///
    /// Sets:
    /// - `template`: template id
    /// - `tag`: `"compiled"` or `"interpreted"`
    StrategyResolved,

    /// The compiled strategy was not eligible; the interpreted one is used.
    ///
    /// Sets:
    /// - `template`: template id
    /// - `reason`: why compilation was skipped
    StrategyFallback,

    /// Memoized strategies were dropped (option change or markup mutation).
    ///
    /// Sets:
    /// - `template`: template id
    StrategyReset,

    // === Render events ===
    /// An interpreted render started.
    ///
    /// Sets:
    /// - `template`: template id
    /// - `node`: target container id
    RenderStarting,

    /// Markup was attached; the subtree handle resolved.
    ///
    /// Sets:
    /// - `template`: template id
    /// - `node`: owner node id
    SubtreeAttached,

    /// Controls and bindings finished; the completion handle resolved.
    ///
    /// Sets:
    /// - `template`: template id
    /// - `node`: owner node id
    RenderCompleted,

    /// The render failed (never emitted for cancellation).
    ///
    /// Sets:
    /// - `template`: template id
    /// - `reason`: failure message
    RenderFailed,

    /// The render was cancelled and its partial output torn down.
    ///
    /// Sets:
    /// - `template`: template id
    RenderCanceled,

    /// First render of a template configured to break on render.
    ///
    /// Sets:
    /// - `template`: template id
    DebugBreak,

    // === Recycling events ===
    /// A recycled subtree was reused.
    ///
    /// Sets:
    /// - `template`: template id
    /// - `node`: recycled node id
    RecycleHit,

    /// A recycle candidate was refused and a fresh subtree is built.
    ///
    /// Sets:
    /// - `template`: template id
    /// - `node`: candidate node id (if any)
    /// - `reason`: why reuse was refused
    RecycleRefused,

    // === Queue events ===
    /// Work was admitted to the queue.
    ///
    /// Sets:
    /// - `work`: work id
    WorkQueued,

    /// Work left the pending list and started.
    ///
    /// Sets:
    /// - `work`: work id
    WorkStarted,

    /// Running work finished and freed its slot.
    ///
    /// Sets:
    /// - `work`: work id
    /// - `reason`: failure message, when it failed
    WorkFinished,

    /// Work was cancelled before it started.
    ///
    /// Sets:
    /// - `work`: work id
    WorkDropped,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Template id, if applicable.
    pub template: Option<u64>,
    /// Node id, if applicable.
    pub node: Option<u64>,
    /// Queue work id, if applicable.
    pub work: Option<u64>,
    /// Delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Short static tag (strategy name, subscriber name).
    pub tag: Option<&'static str>,
    /// Human-readable reason (errors, fallback details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            template: None,
            node: None,
            work: None,
            delay_ms: None,
            tag: None,
            reason: None,
        }
    }

    /// Attaches a template id.
    #[inline]
    pub fn with_template(mut self, id: u64) -> Self {
        self.template = Some(id);
        self
    }

    /// Attaches a node id.
    #[inline]
    pub fn with_node(mut self, id: u64) -> Self {
        self.node = Some(id);
        self
    }

    /// Attaches a queue work id.
    #[inline]
    pub fn with_work(mut self, id: u64) -> Self {
        self.work = Some(id);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a static tag.
    #[inline]
    pub fn with_tag(mut self, tag: &'static str) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_tag(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_tag(subscriber)
            .with_reason(info)
    }
}
