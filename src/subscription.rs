//! Subscription handles and termination signalling.
//!
//! A [`Subscription`] is the type-erased handle for one registration. Feeds,
//! scopes, and producer tasks all share the same handle type, so a
//! [`SubscriptionScope`](crate::SubscriptionScope) can hold subscriptions
//! regardless of where they came from.
//!
//! Termination happens exactly once. It flips the state under the
//! subscription's lock, cancels its token (waking every `err()` waiter and
//! every delivery blocked on channel capacity), then runs completion hooks
//! outside the lock.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::Error;
use crate::observability::metrics::record_unsubscribe;

/// Source of process-unique subscription ids.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type Hook = Box<dyn FnOnce() + Send>;

/// Handle for a single registration.
///
/// Clones refer to the same subscription: unsubscribing through one clone
/// terminates all of them.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    /// Cancelled once, when the subscription terminates.
    token: CancellationToken,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    terminated: bool,
    reason: Option<Error>,
    /// Completion hooks, drained on termination.
    hooks: Vec<Hook>,
}

impl Inner {
    fn reason(&self) -> Option<Error> {
        self.state.lock().unwrap().reason.clone()
    }
}

impl Subscription {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                token: CancellationToken::new(),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Create a subscription backed by a producer task.
    ///
    /// The producer runs on the current tokio runtime and receives a token
    /// that is cancelled when the subscription is unsubscribed. If the
    /// producer returns an error, the subscription terminates with
    /// [`Error::Producer`]; returning `Ok(())` terminates it cleanly.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let sub = Self::new();
        let task = producer(sub.inner.token.child_token());
        let handle = sub.clone();

        tokio::spawn(async move {
            match task.await {
                Ok(()) => {
                    handle.terminate(None);
                }
                Err(err) => {
                    tracing::debug!(subscription = handle.id(), error = %err, "Producer failed");
                    handle.terminate(Some(Error::from(err)));
                }
            }
        });

        sub
    }

    /// Process-unique identifier of this subscription.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Stop delivery to this subscription.
    ///
    /// Idempotent and safe to call concurrently; only the first call has
    /// any effect. When it returns, no further values will be delivered and
    /// every [`err()`](Self::err) future resolves to `None`.
    pub fn unsubscribe(&self) {
        if self.terminate(None) {
            tracing::debug!(subscription = self.inner.id, "Unsubscribed");
        }
    }

    /// Wait for the subscription to terminate.
    ///
    /// Resolves once, with `None` after an unsubscribe or `Some(err)` when
    /// the feed or producer ended it. Resolves immediately if the
    /// subscription has already terminated. The future owns its handle, so
    /// it can be created up front and polled inside `tokio::select!`.
    pub fn err(&self) -> impl Future<Output = Option<Error>> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        async move {
            inner.token.cancelled().await;
            inner.reason()
        }
    }

    /// True once the subscription has terminated for any reason.
    pub fn is_terminated(&self) -> bool {
        self.inner.state.lock().unwrap().terminated
    }

    /// Terminate with the given reason.
    ///
    /// Returns `false` if the subscription had already terminated.
    pub(crate) fn terminate(&self, reason: Option<Error>) -> bool {
        let (kind, hooks) = {
            let mut state = self.inner.state.lock().unwrap();
            if state.terminated {
                return false;
            }
            state.terminated = true;
            let kind = reason.as_ref().map_or("unsubscribe", Error::kind);
            state.reason = reason;
            (kind, std::mem::take(&mut state.hooks))
        };

        record_unsubscribe(kind);
        self.inner.token.cancel();
        for hook in hooks {
            hook();
        }
        true
    }

    /// Register a hook to run once on termination.
    ///
    /// Runs immediately on the calling thread if the subscription has
    /// already terminated. Hooks never run while the subscription's lock is
    /// held, so they may take other locks.
    pub(crate) fn on_terminate<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock().unwrap();
        if state.terminated {
            drop(state);
            hook();
            return;
        }
        state.hooks.push(Box::new(hook));
    }

    /// Run `commit` only if the subscription is still live.
    ///
    /// `commit` runs under the subscription's lock, so it cannot interleave
    /// with termination. Returns whether it ran.
    pub(crate) fn commit<F: FnOnce()>(&self, commit: F) -> bool {
        let state = self.inner.state.lock().unwrap();
        if state.terminated {
            return false;
        }
        commit();
        true
    }

    /// Resolves when the subscription terminates.
    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_ids_are_unique() {
        let a = Subscription::new();
        let b = Subscription::new();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn test_err_pending_until_unsubscribe() {
        let sub = Subscription::new();
        let mut err = task::spawn(sub.err());
        assert_pending!(err.poll());

        sub.unsubscribe();

        assert!(err.is_woken());
        let reason = assert_ready!(err.poll());
        assert!(reason.is_none());
        assert!(sub.is_terminated());
    }

    #[test]
    fn test_err_ready_after_termination() {
        let sub = Subscription::new();
        sub.unsubscribe();

        let mut err = task::spawn(sub.err());
        let reason = assert_ready!(err.poll());
        assert!(reason.is_none());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let sub = Subscription::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        sub.on_terminate(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sub.unsubscribe();
        sub.unsubscribe();
        sub.clone().unsubscribe();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_unsubscribe_signals_once() {
        let sub = Subscription::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        sub.on_terminate(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let sub = sub.clone();
                std::thread::spawn(move || sub.unsubscribe())
            })
            .collect();
        for t in threads {
            t.join().expect("unsubscribe thread panicked");
        }

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(sub.is_terminated());
    }

    #[test]
    fn test_hook_after_termination_runs_immediately() {
        let sub = Subscription::new();
        sub.unsubscribe();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        sub.on_terminate(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_commit_refused_after_termination() {
        let sub = Subscription::new();
        assert!(sub.commit(|| {}));
        sub.unsubscribe();
        assert!(!sub.commit(|| panic!("committed after unsubscribe")));
    }

    #[test]
    fn test_terminate_keeps_first_reason() {
        let sub = Subscription::new();
        assert!(sub.terminate(Some(Error::FeedDropped)));
        assert!(!sub.terminate(None));

        let mut err = task::spawn(sub.err());
        let reason = assert_ready!(err.poll());
        assert!(matches!(reason, Some(Error::FeedDropped)));
    }

    #[tokio::test]
    async fn test_spawn_reports_producer_error() {
        let sub = Subscription::spawn(|_quit| async { Err(anyhow::anyhow!("upstream gone")) });

        let reason = tokio::time::timeout(Duration::from_secs(1), sub.err())
            .await
            .expect("producer subscription did not terminate");

        match reason {
            Some(Error::Producer(err)) => assert_eq!(err.to_string(), "upstream gone"),
            other => panic!("unexpected reason: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_unsubscribe_stops_producer() {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let sub = Subscription::spawn(|quit| async move {
            quit.cancelled().await;
            let _ = done_tx.send(());
            Ok(())
        });

        sub.unsubscribe();

        tokio::time::timeout(Duration::from_secs(1), done_rx)
            .await
            .expect("producer did not observe cancellation")
            .expect("producer dropped its signal");
        assert!(sub.err().await.is_none());
    }
}
