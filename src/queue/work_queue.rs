//! # WorkQueue: at most N closures in flight.
//!
//! ```text
//! enqueue(f, meta, prioritize) ──► pending (front|back) + items[id] ──► run()
//!
//! run():  processing += 1
//!   loop (lock) ─ running < max && next live id? ─no─► processing -= 1; stop
//!          │yes: running += 1, items.remove(id)
//!          ▼
//!   f() outside the lock (panics caught)
//!     ├─ Err / panic / already settled ──► running -= 1 inline, loop again
//!     └─ still running ──► watcher task ──► run_next()
//!
//! run_next():  running -= 1; if processing == 0 → Scheduler::schedule(run)
//! ```
//!
//! ## Rules
//! - A closure runs at most once; ids removed by cancellation are skipped.
//! - Synchronous completions are handled inside the loop, never by recursion,
//!   so a long run of instantly finishing work uses constant stack.
//! - The capacity check that ends a loop and the `processing` decrement share
//!   one lock section, so a completion can never miss the need to re-trigger.
//! - Cancelling a caller handle removes a queued entry or cancels the work
//!   the closure returned.
//! - `max_running = 0` selects [`DEFAULT_MAX_RUNNING`].

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::RenderError;
use crate::events::{Bus, Event, EventKind};
use crate::task::{Outcome, Priority, Scheduler, Work};
use crate::template::Services;

/// Concurrency used when `max_running` is 0.
pub const DEFAULT_MAX_RUNNING: usize = 3;

/// What starting an entry produced.
enum Started {
    /// Finished while starting; carries the failure message, if any.
    Done(Option<String>),
    /// Still running; the future settles the caller handle when it completes.
    Running(BoxFuture<'static, Option<String>>),
}

type Starter = Box<dyn FnOnce() -> Started + Send + 'static>;

struct Entry<M> {
    metadata: M,
    start: Starter,
}

struct QueueState<M> {
    pending: VecDeque<u64>,
    items: HashMap<u64, Entry<M>>,
    running: usize,
    processing: usize,
    next_id: u64,
}

struct QueueInner<M> {
    max_running: usize,
    scheduler: Arc<dyn Scheduler>,
    bus: Option<Bus>,
    state: Mutex<QueueState<M>>,
}

/// Bounded-concurrency queue of work closures tagged with metadata `M`.
pub struct WorkQueue<M>
where
    M: Send + 'static,
{
    inner: Arc<QueueInner<M>>,
}

impl<M> Clone for WorkQueue<M>
where
    M: Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> WorkQueue<M>
where
    M: Send + 'static,
{
    /// Creates a queue running at most `max_running` closures (0 = default of 3).
    pub fn new(max_running: usize, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::build(max_running, scheduler, None)
    }

    /// Creates a queue using the scheduler and event bus of `services`.
    pub fn from_services(max_running: usize, services: &Services) -> Self {
        Self::build(
            max_running,
            Arc::clone(services.scheduler()),
            Some(services.bus().clone()),
        )
    }

    fn build(max_running: usize, scheduler: Arc<dyn Scheduler>, bus: Option<Bus>) -> Self {
        let max_running = match max_running {
            0 => DEFAULT_MAX_RUNNING,
            n => n,
        };
        Self {
            inner: Arc::new(QueueInner {
                max_running,
                scheduler,
                bus,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    items: HashMap::new(),
                    running: 0,
                    processing: 0,
                    next_id: 0,
                }),
            }),
        }
    }

    /// Effective concurrency bound.
    pub fn max_running(&self) -> usize {
        self.inner.max_running
    }

    /// Closures currently running.
    pub fn running(&self) -> usize {
        self.inner.lock().running
    }

    /// Queued entries not yet started (cancelled ones excluded).
    pub fn pending_len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Queues `work` and returns a handle to its eventual outcome.
    ///
    /// `work` returns the [`Work`] it started; returning `Err` or panicking
    /// counts as an immediate completion that rejects the handle. With
    /// `prioritize` the entry goes to the front of the pending list.
    pub fn enqueue<T, F>(&self, work: F, metadata: M, prioritize: bool) -> Work<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Result<Work<T>, RenderError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Outcome<T>>();
        let token = CancellationToken::new();
        let in_flight: Arc<Mutex<Option<CancellationToken>>> = Arc::new(Mutex::new(None));

        let start: Starter = {
            let token = token.clone();
            let in_flight = Arc::clone(&in_flight);
            Box::new(move || start_entry(work, tx, token, in_flight))
        };

        let id = {
            let mut st = self.inner.lock();
            let id = st.next_id;
            st.next_id += 1;
            st.items.insert(id, Entry { metadata, start });
            if prioritize {
                st.pending.push_front(id);
            } else {
                st.pending.push_back(id);
            }
            id
        };
        self.inner.publish(Event::new(EventKind::WorkQueued).with_work(id));

        let queue: Weak<QueueInner<M>> = Arc::downgrade(&self.inner);
        let guard = token.clone();
        let handle = Work::spawn(token, async move {
            tokio::select! {
                biased;
                _ = guard.cancelled() => {
                    if let Some(queue) = queue.upgrade() {
                        queue.drop_pending(id);
                    }
                    let running = in_flight.lock().unwrap_or_else(PoisonError::into_inner).take();
                    if let Some(running) = running {
                        running.cancel();
                    }
                    Err(RenderError::Canceled)
                }
                out = rx => out.unwrap_or(Err(RenderError::Canceled)),
            }
        });

        QueueInner::run(&self.inner);
        handle
    }

    /// Re-sorts pending entries by `cmp` over their metadata.
    ///
    /// The sort is stable; ids whose entries are gone sort last.
    pub fn reorder<C>(&self, cmp: C)
    where
        C: Fn(&M, &M) -> Ordering,
    {
        let mut st = self.inner.lock();
        let mut ids: Vec<u64> = std::mem::take(&mut st.pending).into();
        ids.sort_by(|a, b| match (st.items.get(a), st.items.get(b)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => cmp(&x.metadata, &y.metadata),
        });
        st.pending = ids.into();
    }

    /// Metadata of pending entries in run order.
    pub fn pending_metadata(&self) -> Vec<M>
    where
        M: Clone,
    {
        let st = self.inner.lock();
        st.pending
            .iter()
            .filter_map(|id| st.items.get(id).map(|e| e.metadata.clone()))
            .collect()
    }
}

fn start_entry<T, F>(
    work: F,
    tx: oneshot::Sender<Outcome<T>>,
    token: CancellationToken,
    in_flight: Arc<Mutex<Option<CancellationToken>>>,
) -> Started
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> Result<Work<T>, RenderError> + Send + 'static,
{
    let started = match catch_unwind(AssertUnwindSafe(work)) {
        Ok(Ok(w)) => w,
        Ok(Err(e)) => {
            let reason = e.to_string();
            let _ = tx.send(Err(e));
            return Started::Done(Some(reason));
        }
        Err(payload) => {
            let e = RenderError::from_panic(payload);
            let reason = e.to_string();
            let _ = tx.send(Err(e));
            return Started::Done(Some(reason));
        }
    };

    *in_flight.lock().unwrap_or_else(PoisonError::into_inner) = Some(started.token().clone());
    if token.is_cancelled() {
        started.cancel();
    }

    if let Some(out) = started.try_outcome() {
        let reason = out.as_ref().err().map(ToString::to_string);
        let _ = tx.send(out);
        return Started::Done(reason);
    }
    Started::Running(Box::pin(async move {
        let out = started.wait().await;
        let reason = out.as_ref().err().map(ToString::to_string);
        let _ = tx.send(out);
        reason
    }))
}

impl<M> QueueInner<M>
where
    M: Send + 'static,
{
    fn lock(&self) -> MutexGuard<'_, QueueState<M>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, ev: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(ev);
        }
    }

    fn drop_pending(&self, id: u64) {
        let removed = self.lock().items.remove(&id).is_some();
        if removed {
            self.publish(Event::new(EventKind::WorkDropped).with_work(id));
        }
    }

    /// Starts entries until capacity or the pending list is exhausted.
    fn run(this: &Arc<Self>) {
        this.lock().processing += 1;
        loop {
            let next = {
                let mut st = this.lock();
                let mut next = None;
                if st.running < this.max_running {
                    while let Some(id) = st.pending.pop_front() {
                        if let Some(entry) = st.items.remove(&id) {
                            next = Some((id, entry));
                            break;
                        }
                    }
                }
                match next {
                    Some(found) => {
                        st.running += 1;
                        Some(found)
                    }
                    None => {
                        st.processing -= 1;
                        None
                    }
                }
            };
            let Some((id, entry)) = next else {
                break;
            };

            this.publish(Event::new(EventKind::WorkStarted).with_work(id));
            match (entry.start)() {
                Started::Done(reason) => {
                    this.lock().running -= 1;
                    this.finished(id, reason);
                }
                Started::Running(fut) => {
                    let queue = Arc::clone(this);
                    tokio::spawn(async move {
                        let reason = fut.await;
                        Self::run_next(&queue, id, reason);
                    });
                }
            }
        }
    }

    /// Frees the slot of an asynchronously completed entry.
    fn run_next(this: &Arc<Self>, id: u64, reason: Option<String>) {
        let retrigger = {
            let mut st = this.lock();
            st.running -= 1;
            st.processing == 0
        };
        this.finished(id, reason);
        if retrigger {
            let queue = Arc::clone(this);
            this.scheduler.schedule(
                Box::new(move || Self::run(&queue)),
                Priority::Normal,
                "WorkQueue::run_next",
            );
        }
    }

    fn finished(&self, id: u64, reason: Option<String>) {
        let mut ev = Event::new(EventKind::WorkFinished).with_work(id);
        if let Some(reason) = reason {
            ev = ev.with_reason(reason);
        }
        self.publish(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TokioScheduler;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::time::Duration;

    fn queue<M: Send + 'static>(max: usize) -> WorkQueue<M> {
        WorkQueue::new(max, Arc::new(TokioScheduler))
    }

    #[tokio::test]
    async fn zero_selects_the_default_bound() {
        assert_eq!(queue::<()>(0).max_running(), DEFAULT_MAX_RUNNING);
        assert_eq!(queue::<()>(5).max_running(), 5);
    }

    #[tokio::test]
    async fn never_exceeds_the_bound() {
        let q = queue::<usize>(2);
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for i in 0..6 {
            let live = Arc::clone(&live);
            let peak = Arc::clone(&peak);
            handles.push(q.enqueue(
                move || {
                    let now = live.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                    peak.fetch_max(now, AtomicOrdering::SeqCst);
                    Ok(Work::spawn(CancellationToken::new(), async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        live.fetch_sub(1, AtomicOrdering::SeqCst);
                        Ok(i)
                    }))
                },
                i,
                false,
            ));
        }
        assert_eq!(q.running(), 2);
        assert_eq!(q.pending_len(), 4);
        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.await, Ok(i));
        }
        assert!(peak.load(AtomicOrdering::SeqCst) <= 2);
        assert_eq!(q.running(), 0);
    }

    #[tokio::test]
    async fn synchronous_completions_drain_inline() {
        let q = queue::<()>(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..5)
            .map(|i| {
                let calls = Arc::clone(&calls);
                q.enqueue(
                    move || {
                        calls.fetch_add(1, AtomicOrdering::SeqCst);
                        Ok(Work::ready(i))
                    },
                    (),
                    false,
                )
            })
            .collect();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 5);
        assert_eq!(q.running(), 0);
        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.await, Ok(i));
        }
    }

    #[tokio::test]
    async fn errors_and_panics_free_their_slot() {
        let q = queue::<()>(1);
        let failed: Work<u8> = q.enqueue(|| Err(RenderError::binding("nope")), (), false);
        let panicked: Work<u8> = q.enqueue(
            || -> Result<Work<u8>, RenderError> { panic!("closure exploded") },
            (),
            false,
        );
        let ok = q.enqueue(|| Ok(Work::ready(3_u8)), (), false);

        assert_eq!(failed.await, Err(RenderError::binding("nope")));
        assert!(matches!(panicked.await, Err(RenderError::Panicked { .. })));
        assert_eq!(ok.await, Ok(3));
    }

    #[tokio::test]
    async fn cancelled_queued_work_never_runs() {
        let q = queue::<()>(1);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let blocker = q.enqueue(
            move || {
                Ok(Work::spawn(CancellationToken::new(), async move {
                    let _ = release_rx.await;
                    Ok(())
                }))
            },
            (),
            false,
        );
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        let queued = q.enqueue(
            move || {
                r.fetch_add(1, AtomicOrdering::SeqCst);
                Ok(Work::ready(()))
            },
            (),
            false,
        );
        queued.cancel();
        assert_eq!(queued.wait().await, Err(RenderError::Canceled));
        assert_eq!(q.pending_len(), 0);

        let _ = release_tx.send(());
        assert_eq!(blocker.await, Ok(()));
        tokio::task::yield_now().await;
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelling_running_work_cancels_what_it_returned() {
        let q = queue::<()>(1);
        let inner_token = CancellationToken::new();
        let observed = inner_token.clone();
        let handle: Work<()> = q.enqueue(
            move || {
                Ok(Work::cancellable(inner_token, async {
                    futures::future::pending::<()>().await;
                    Ok(())
                }))
            },
            (),
            false,
        );
        handle.cancel();
        assert_eq!(handle.wait().await, Err(RenderError::Canceled));
        assert!(observed.is_cancelled());
    }

    #[tokio::test]
    async fn reorder_is_stable_and_prioritize_jumps_ahead() {
        let q = queue::<u32>(1);
        let (tx, rx) = oneshot::channel::<()>();
        let _blocker = q.enqueue(
            move || {
                Ok(Work::spawn(CancellationToken::new(), async move {
                    let _ = rx.await;
                    Ok(())
                }))
            },
            0,
            false,
        );
        let handles: Vec<Work<()>> = [3_u32, 1, 2, 1]
            .into_iter()
            .map(|m| q.enqueue(|| Ok(Work::ready(())), m, false))
            .collect();
        let urgent: Work<()> = q.enqueue(|| Ok(Work::ready(())), 9, true);
        assert_eq!(q.pending_metadata(), vec![9, 3, 1, 2, 1]);

        handles[1].cancel();
        assert!(handles[1].wait().await.is_err());
        q.reorder(|a, b| a.cmp(b));
        assert_eq!(q.pending_metadata(), vec![1, 2, 3, 9]);

        let _ = tx.send(());
        assert_eq!(urgent.await, Ok(()));
    }
}
