//! # Cooperative scheduler seam.
//!
//! The engine never spawns "later" work directly; it goes through a
//! [`Scheduler`] so hosts can route continuations onto their own loop.
//! [`TokioScheduler`] is the default and maps every job onto `tokio::spawn`.
//!
//! Two call sites use it:
//! - the work queue's deferred re-trigger (`WorkQueue::run_next`);
//! - the configured render delay before control/binding processing.

use std::time::Duration;

use tokio::sync::oneshot;

/// A scheduled continuation.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Relative urgency of a scheduled job.
///
/// Hosts with a real priority loop may honor it; [`TokioScheduler`] only
/// reports it in traces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Max,
    High,
    AboveNormal,
    #[default]
    Normal,
    BelowNormal,
    Idle,
    Min,
}

/// Host scheduling capability.
pub trait Scheduler: Send + Sync + 'static {
    /// Runs `job` at a later scheduling turn, never inline.
    fn schedule(&self, job: Job, priority: Priority, tag: &'static str);

    /// Runs `job` once `delay` has elapsed.
    fn schedule_after(&self, delay: Duration, job: Job, priority: Priority, tag: &'static str);
}

/// Default scheduler backed by the ambient tokio runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, job: Job, priority: Priority, tag: &'static str) {
        tracing::trace!(tag, ?priority, "schedule");
        tokio::spawn(async move { job() });
    }

    fn schedule_after(&self, delay: Duration, job: Job, priority: Priority, tag: &'static str) {
        tracing::trace!(tag, ?priority, delay_ms = delay.as_millis() as u64, "schedule_after");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job()
        });
    }
}

/// Suspends the caller until the scheduler runs a wake-up job.
///
/// `None` yields once (next scheduling turn); `Some(d)` waits for `d`.
pub(crate) async fn next_turn(scheduler: &dyn Scheduler, delay: Option<Duration>, tag: &'static str) {
    let (tx, rx) = oneshot::channel::<()>();
    let wake: Job = Box::new(move || {
        let _ = tx.send(());
    });
    match delay {
        Some(d) => scheduler.schedule_after(d, wake, Priority::Normal, tag),
        None => scheduler.schedule(wake, Priority::Normal, tag),
    }
    // A scheduler that drops the job still lets the caller proceed.
    let _ = rx.await;
}
