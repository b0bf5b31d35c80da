//! # LogWriter: event to `tracing` bridge
//!
//! A minimal subscriber that turns every [`Event`] into one `tracing` record
//! under the `bindery::events` target. Failures log at `warn`, everything
//! else at `debug`.
//!
//! ## Example output
//! ```text
//! DEBUG bindery::events: [render-starting] template=Some(1) node=Some(4)
//! DEBUG bindery::events: [strategy-resolved] template=Some(1) strategy=Some("interpreted")
//! WARN  bindery::events: [render-failed] template=Some(1) err=Some("binding application failed: boom")
//! DEBUG bindery::events: [work-finished] work=Some(3) err=None
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let reason = e.reason.as_deref();
        match e.kind {
            EventKind::SubscriberPanicked => {
                tracing::warn!(target: "bindery::events", "[subscriber-panicked] subscriber={} info={}",
                    e.tag.unwrap_or("unknown"), reason.unwrap_or("unknown"));
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "bindery::events", "[subscriber-overflow] subscriber={:?} reason={:?}", e.tag, reason);
            }
            EventKind::TemplateCreated => {
                tracing::debug!(target: "bindery::events", "[template-created] template={:?}", e.template);
            }
            EventKind::StrategyResolved => {
                tracing::debug!(target: "bindery::events", "[strategy-resolved] template={:?} strategy={:?}", e.template, e.tag);
            }
            EventKind::StrategyFallback => {
                tracing::debug!(target: "bindery::events", "[strategy-fallback] template={:?} reason={:?}", e.template, reason);
            }
            EventKind::StrategyReset => {
                tracing::debug!(target: "bindery::events", "[strategy-reset] template={:?}", e.template);
            }
            EventKind::RenderStarting => {
                tracing::debug!(target: "bindery::events", "[render-starting] template={:?} node={:?} delay_ms={:?}",
                    e.template, e.node, e.delay_ms);
            }
            EventKind::SubtreeAttached => {
                tracing::debug!(target: "bindery::events", "[subtree-attached] template={:?} node={:?}", e.template, e.node);
            }
            EventKind::RenderCompleted => {
                tracing::debug!(target: "bindery::events", "[render-completed] template={:?} node={:?}", e.template, e.node);
            }
            EventKind::RenderFailed => {
                tracing::warn!(target: "bindery::events", "[render-failed] template={:?} err={:?}", e.template, reason);
            }
            EventKind::RenderCanceled => {
                tracing::debug!(target: "bindery::events", "[render-canceled] template={:?}", e.template);
            }
            EventKind::DebugBreak => {
                tracing::info!(target: "bindery::events", "[debug-break] template={:?}", e.template);
            }
            EventKind::RecycleHit => {
                tracing::debug!(target: "bindery::events", "[recycle-hit] template={:?} node={:?}", e.template, e.node);
            }
            EventKind::RecycleRefused => {
                tracing::debug!(target: "bindery::events", "[recycle-refused] template={:?} node={:?} reason={:?}",
                    e.template, e.node, reason);
            }
            EventKind::WorkQueued => {
                tracing::debug!(target: "bindery::events", "[work-queued] work={:?}", e.work);
            }
            EventKind::WorkStarted => {
                tracing::debug!(target: "bindery::events", "[work-started] work={:?}", e.work);
            }
            EventKind::WorkFinished => {
                tracing::debug!(target: "bindery::events", "[work-finished] work={:?} err={:?}", e.work, reason);
            }
            EventKind::WorkDropped => {
                tracing::debug!(target: "bindery::events", "[work-dropped] work={:?}", e.work);
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
