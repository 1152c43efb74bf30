use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use docgraph_core::StageError;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use once_cell::sync::OnceCell;
use tracing::debug;

/// Result of one pipeline stage for one document. Failures are cached just
/// like successes.
pub type Outcome<T> = Result<Arc<T>, StageError>;

type SharedOutcome<T> = Shared<BoxFuture<'static, Outcome<T>>>;

/// Observable state of a [`CacheEntry`].
#[derive(Debug, Clone)]
pub enum EntryState<T> {
    /// The computation has not produced an outcome yet.
    Pending,
    /// The computation has finished. The outcome may not have been drained
    /// into the settled slot yet; it is visible either way.
    Settled(Outcome<T>),
}

/// Single-assignment cell for one (document, stage, generation).
///
/// Holds a shared computation every requester awaits, and a settled slot that
/// waiters drain the outcome into once it completes. Dropping one waiter never
/// cancels the computation for the others.
pub struct CacheEntry<T> {
    computation: SharedOutcome<T>,
    settled: Arc<OnceCell<Outcome<T>>>,
    driven: AtomicBool,
}

impl<T> CacheEntry<T>
where
    T: Send + Sync + 'static,
{
    pub fn pending<F>(computation: F) -> Self
    where
        F: Future<Output = Outcome<T>> + Send + 'static,
    {
        Self {
            computation: computation.boxed().shared(),
            settled: Arc::new(OnceCell::new()),
            driven: AtomicBool::new(false),
        }
    }

    /// An entry wrapping an already resolved computation.
    pub fn resolved(outcome: Outcome<T>) -> Self {
        Self {
            computation: future::ready(outcome.clone()).boxed().shared(),
            settled: Arc::new(OnceCell::with_value(outcome)),
            driven: AtomicBool::new(true),
        }
    }

    /// Await the outcome, driving the shared computation if needed.
    pub async fn get(&self) -> Outcome<T> {
        if let Some(outcome) = self.settled.get() {
            return outcome.clone();
        }
        let outcome = self.computation.clone().await;
        let _ = self.settled.set(outcome.clone());
        outcome
    }

    pub fn state(&self) -> EntryState<T> {
        match self.settled.get() {
            Some(outcome) => EntryState::Settled(outcome.clone()),
            None => match self.computation.peek() {
                Some(outcome) => EntryState::Settled(outcome.clone()),
                None => EntryState::Pending,
            },
        }
    }

    /// The outcome, once the computation has produced one.
    pub fn settled(&self) -> Option<Outcome<T>> {
        match self.state() {
            EntryState::Settled(outcome) => Some(outcome),
            EntryState::Pending => None,
        }
    }

    /// The settled value, if the stage succeeded.
    pub fn value(&self) -> Option<Arc<T>> {
        self.settled().and_then(Result::ok)
    }

    /// True until the outcome has been drained into the settled slot. A
    /// pending entry whose computation already finished reports
    /// [`EntryState::Settled`] from [`CacheEntry::state`].
    pub fn is_pending(&self) -> bool {
        self.settled.get().is_none()
    }

    /// Make the computation progress without a waiter. Spawns at most one
    /// driver task on the ambient tokio runtime.
    pub fn drive(&self) {
        if !self.is_pending() || self.driven.swap(true, Ordering::AcqRel) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let computation = self.computation.clone();
                let slot = Arc::clone(&self.settled);
                handle.spawn(async move {
                    let _ = slot.set(computation.await);
                });
            }
            Err(_) => {
                // no runtime: the first `get` runs the work instead
                self.driven.store(false, Ordering::Release);
                debug!("no tokio runtime to drive cache entry, deferring to first get");
            }
        }
    }

    /// Run the computation to completion without draining its outcome.
    #[cfg(test)]
    pub(crate) async fn run_undrained(&self) -> Outcome<T> {
        self.computation.clone().await
    }
}

impl<T> fmt::Debug for CacheEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.settled.get().or_else(|| self.computation.peek()) {
            Some(Ok(_)) => "settled",
            Some(Err(_)) => "failed",
            None => "pending",
        };
        f.debug_struct("CacheEntry").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgraph_core::Stage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn computation_runs_once_for_all_waiters() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let entry = Arc::new(CacheEntry::pending(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(Arc::new(42u32))
        }));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let entry = Arc::clone(&entry);
            handles.push(tokio::spawn(async move { entry.get().await }));
        }
        for handle in handles {
            assert_eq!(*handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!entry.is_pending());
        assert_eq!(entry.value().as_deref(), Some(&42));
    }

    #[tokio::test]
    async fn abandoned_waiter_does_not_cancel() {
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();
        let entry = Arc::new(CacheEntry::pending(async move {
            let v = rx.await.unwrap_or(0);
            Ok(Arc::new(v))
        }));

        let waiter = {
            let entry = Arc::clone(&entry);
            tokio::spawn(async move { entry.get().await })
        };
        tokio::task::yield_now().await;
        waiter.abort();
        let _ = waiter.await;

        tx.send(7).unwrap();
        assert_eq!(*entry.get().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn failures_are_settled() {
        let entry: CacheEntry<String> = CacheEntry::pending(async {
            Err(StageError::new("a.html".into(), Stage::Parse, "bad"))
        });
        let first = entry.get().await.unwrap_err();
        let second = entry.get().await.unwrap_err();
        assert_eq!(first, second);
        assert!(matches!(entry.state(), EntryState::Settled(Err(_))));
        assert!(entry.value().is_none());
    }

    #[tokio::test]
    async fn drive_settles_without_waiter() {
        let entry = CacheEntry::pending(async { Ok(Arc::new("done".to_string())) });
        assert!(entry.is_pending());
        entry.drive();
        for _ in 0..100 {
            if !entry.is_pending() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(entry.value().as_deref().map(String::as_str), Some("done"));
    }

    #[tokio::test]
    async fn finished_computation_is_visible_before_draining() {
        let entry = CacheEntry::pending(async { Ok(Arc::new(3u16)) });
        assert!(matches!(entry.state(), EntryState::Pending));

        entry.run_undrained().await.unwrap();
        assert!(entry.is_pending());
        assert!(matches!(entry.state(), EntryState::Settled(Ok(_))));
        assert_eq!(entry.value().as_deref(), Some(&3));

        entry.get().await.unwrap();
        assert!(!entry.is_pending());
    }

    #[test]
    fn drive_without_runtime_defers_to_get() {
        let entry = CacheEntry::pending(async { Ok(Arc::new(5u8)) });
        entry.drive();
        assert!(entry.is_pending());
        assert_eq!(*tokio_test::block_on(entry.get()).unwrap(), 5);
        assert!(!entry.is_pending());
    }

    #[test]
    fn resolved_entry_is_settled_immediately() {
        let entry = CacheEntry::resolved(Ok(Arc::new(1u8)));
        assert!(!entry.is_pending());
        assert_eq!(*tokio_test::block_on(entry.get()).unwrap(), 1);
    }
}
