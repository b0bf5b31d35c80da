//! # Cancellable work handles.
//!
//! [`Work<T>`] is the deferred-computation primitive every other part of the
//! crate is built on. It pairs an eagerly spawned tokio task with the
//! [`CancellationToken`] that governs it.
//!
//! ## Rules
//! - Work starts immediately (spawned), whether or not anyone awaits it.
//! - The outcome is computed **once** and shared by every clone of the handle,
//!   so a handle is never both resolved and rejected.
//! - Cancellation is cooperative: [`Work::cancel`] trips the token; the stage
//!   either observes it itself ([`Work::spawn`]) or is raced against it
//!   ([`Work::cancellable`]).
//! - A handle built with [`Work::ready`] / [`Work::failed`] is settled at
//!   construction, which lets callers detect synchronous completion through
//!   [`Work::try_outcome`].
//!
//! ```text
//!   Work::spawn(token, fut) ──► tokio::spawn ──► settle(OnceLock) ──► Shared outcome
//!                                                      ▲
//!   work.cancel() ──► token.cancel() ─── observed ─────┘
//! ```

use std::future::{Future, IntoFuture};
use std::sync::{Arc, OnceLock};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio_util::sync::CancellationToken;

use crate::error::RenderError;

/// Result carried by every [`Work`] handle.
pub type Outcome<T> = Result<T, RenderError>;

/// Shareable, cancellable handle to a unit of asynchronous work.
pub struct Work<T>
where
    T: Clone + Send + Sync + 'static,
{
    outcome: Shared<BoxFuture<'static, Outcome<T>>>,
    settled: Arc<OnceLock<Outcome<T>>>,
    token: CancellationToken,
}

impl<T> Clone for Work<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            outcome: self.outcome.clone(),
            settled: Arc::clone(&self.settled),
            token: self.token.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Work<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Work")
            .field("settled", &self.settled.get().is_some())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl<T> Work<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Spawns `fut` and returns its handle.
    ///
    /// `fut` is responsible for observing `token` itself; use this when the
    /// stage needs to run cleanup on cancellation before settling.
    pub fn spawn<F>(token: CancellationToken, fut: F) -> Self
    where
        F: Future<Output = Outcome<T>> + Send + 'static,
    {
        let settled: Arc<OnceLock<Outcome<T>>> = Arc::new(OnceLock::new());
        let slot = Arc::clone(&settled);
        let join = tokio::spawn(async move {
            let out = fut.await;
            let _ = slot.set(out.clone());
            out
        });

        let slot = Arc::clone(&settled);
        let outcome = async move {
            let out = match join.await {
                Ok(out) => out,
                Err(je) if je.is_panic() => Err(RenderError::from_panic(je.into_panic())),
                Err(_) => Err(RenderError::Canceled),
            };
            let _ = slot.set(out.clone());
            out
        }
        .boxed()
        .shared();

        Self {
            outcome,
            settled,
            token,
        }
    }

    /// Spawns `fut` raced against `token`: cancellation settles the handle
    /// with [`RenderError::Canceled`] and drops the stage.
    pub fn cancellable<F>(token: CancellationToken, fut: F) -> Self
    where
        F: Future<Output = Outcome<T>> + Send + 'static,
    {
        let guard = token.clone();
        Self::spawn(token, async move {
            tokio::select! {
                biased;
                _ = guard.cancelled() => Err(RenderError::Canceled),
                out = fut => out,
            }
        })
    }

    /// A handle that is already resolved with `value`.
    pub fn ready(value: T) -> Self {
        Self::settled_with(Ok(value))
    }

    /// A handle that is already rejected with `error`.
    pub fn failed(error: RenderError) -> Self {
        Self::settled_with(Err(error))
    }

    fn settled_with(out: Outcome<T>) -> Self {
        let settled = Arc::new(OnceLock::new());
        let _ = settled.set(out.clone());
        Self {
            outcome: futures::future::ready(out).boxed().shared(),
            settled,
            token: CancellationToken::new(),
        }
    }

    /// Requests cancellation of the work.
    ///
    /// Has no effect on a handle that already settled.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token governing this work.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the outcome if the work already settled.
    pub fn try_outcome(&self) -> Option<Outcome<T>> {
        self.settled.get().cloned()
    }

    /// True once the work has settled (resolved or rejected).
    pub fn is_settled(&self) -> bool {
        self.settled.get().is_some()
    }

    /// Waits for the outcome.
    pub async fn wait(&self) -> Outcome<T> {
        self.outcome.clone().await
    }

    /// Chains a transformation of the resolved value.
    ///
    /// The returned handle shares this handle's token: cancelling either one
    /// cancels both.
    pub fn map<U, F>(&self, f: F) -> Work<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        if let Some(out) = self.try_outcome() {
            let mut mapped = Work::settled_with(out.map(f));
            mapped.token = self.token.clone();
            return mapped;
        }
        let source = self.clone();
        Work::cancellable(self.token.clone(), async move { source.wait().await.map(f) })
    }
}

impl<T> IntoFuture for Work<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Outcome<T>;
    type IntoFuture = Shared<BoxFuture<'static, Outcome<T>>>;

    fn into_future(self) -> Self::IntoFuture {
        self.outcome
    }
}

/// A value that is either available now or still being produced.
///
/// Used for data contexts and items handed to render operations.
#[derive(Clone, Debug)]
pub enum Pending<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Value available synchronously.
    Ready(T),
    /// Value produced by other work.
    Deferred(Work<T>),
}

impl<T> Pending<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Maps the eventual value.
    pub fn map<U, F>(self, f: F) -> Pending<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self {
            Pending::Ready(v) => Pending::Ready(f(v)),
            Pending::Deferred(w) => Pending::Deferred(w.map(f)),
        }
    }

    /// Resolves the value behind a cancel blocker.
    ///
    /// Cancelling `token` rejects the wait with [`RenderError::Canceled`] but
    /// never cancels the deferred work itself: the caller owns it and may share
    /// it with other renders. Failures of the deferred work are reported as
    /// [`RenderError::DataContext`].
    pub(crate) async fn resolve_blocked(self, token: &CancellationToken) -> Outcome<T> {
        match self {
            Pending::Ready(v) => Ok(v),
            Pending::Deferred(w) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(RenderError::Canceled),
                    out = w.wait() => out.map_err(RenderError::from_data_context),
                }
            }
        }
    }
}

impl<T> From<Work<T>> for Pending<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from(work: Work<T>) -> Self {
        Pending::Deferred(work)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn ready_handles_are_settled_synchronously() {
        let w = Work::ready(7_u32);
        assert!(w.is_settled());
        assert_eq!(w.try_outcome(), Some(Ok(7)));
        assert_eq!(w.await, Ok(7));
    }

    #[tokio::test]
    async fn spawned_work_runs_without_being_awaited() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let _w = Work::spawn(CancellationToken::new(), async move {
            let _ = tx.send(());
            Ok::<_, RenderError>(())
        });
        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("spawned work should start eagerly")
            .expect("sender kept alive until send");
    }

    #[tokio::test]
    async fn cancellable_work_settles_canceled_once() {
        let w: Work<u32> = Work::cancellable(CancellationToken::new(), async {
            futures::future::pending::<()>().await;
            Ok(1)
        });
        w.cancel();
        assert_eq!(w.wait().await, Err(RenderError::Canceled));
        w.cancel();
        assert_eq!(w.wait().await, Err(RenderError::Canceled));
    }

    #[tokio::test]
    async fn map_shares_the_source_token() {
        let src: Work<u32> = Work::cancellable(CancellationToken::new(), async {
            futures::future::pending::<()>().await;
            Ok(1)
        });
        let mapped = src.map(|v| v + 1);
        mapped.cancel();
        assert!(src.token().is_cancelled());
        assert_eq!(src.wait().await, Err(RenderError::Canceled));
    }

    #[tokio::test]
    async fn blocker_does_not_cancel_the_data_work() {
        let data: Work<u32> = Work::cancellable(CancellationToken::new(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(5)
        });
        let token = CancellationToken::new();
        token.cancel();
        let pending = Pending::from(data.clone());
        assert_eq!(
            pending.resolve_blocked(&token).await,
            Err(RenderError::Canceled)
        );
        assert!(!data.token().is_cancelled());
        assert_eq!(data.wait().await, Ok(5));
    }

    #[tokio::test]
    async fn blocker_reports_data_failures_distinctly() {
        let data: Work<u32> = Work::failed(RenderError::markup("gone"));
        let out = Pending::from(data)
            .resolve_blocked(&CancellationToken::new())
            .await;
        assert!(matches!(out, Err(RenderError::DataContext { .. })));
    }
}
