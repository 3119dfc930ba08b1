//! Batch teardown for subscriptions from any number of feeds.
//!
//! A [`SubscriptionScope`] tracks subscriptions under fresh tokens and
//! closes all of them at once. Tracked subscriptions that terminate on
//! their own are forgotten through a completion hook, so [`count`] stays
//! accurate even when callers bypass the scope.
//!
//! Lock order: the scope lock is never held while a subscription
//! terminates. `close` drains the map first and unsubscribes afterwards,
//! because each termination runs a hook that takes the scope lock again.
//! A separate teardown lock spans the whole of `close`, so a concurrent
//! second `close` returns only once the first has finished.
//!
//! [`count`]: SubscriptionScope::count

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::observability::metrics::record_scope_close;
use crate::subscription::Subscription;

/// Tracks subscriptions so they can be closed together.
///
/// Clones share the same tracked set and closed flag.
#[derive(Clone, Default)]
pub struct SubscriptionScope {
    inner: Arc<ScopeInner>,
}

#[derive(Default)]
struct ScopeInner {
    state: Mutex<ScopeState>,
    /// Held for the whole of `close`, so every caller returns only after
    /// teardown has finished. Never taken by completion hooks.
    closing: Mutex<()>,
    next_token: AtomicU64,
}

#[derive(Default)]
struct ScopeState {
    subs: HashMap<u64, Subscription>,
    closed: bool,
}

impl SubscriptionScope {
    /// Create an open, empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `sub` and hand it back.
    ///
    /// If the scope is already closed, `sub` is unsubscribed immediately and
    /// not tracked, so it never outlives the scope.
    pub fn track(&self, sub: Subscription) -> Subscription {
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);

        {
            let mut state = self.inner.state.lock().unwrap();
            if state.closed {
                drop(state);
                tracing::debug!(subscription = sub.id(), "Scope closed, unsubscribing");
                sub.unsubscribe();
                return sub;
            }
            state.subs.insert(token, sub.clone());
        }

        // Registered outside the lock: the hook runs at once if `sub` has
        // already terminated.
        let scope = Arc::downgrade(&self.inner);
        sub.on_terminate(move || {
            if let Some(scope) = scope.upgrade() {
                scope.forget(token);
            }
        });

        tracing::debug!(subscription = sub.id(), token, "Tracking subscription");
        sub
    }

    /// Close the scope and unsubscribe everything it tracks.
    ///
    /// Only the first call has an effect. Once any call returns, every
    /// subscription tracked when the scope closed has terminated, and later
    /// [`track`](Self::track) calls unsubscribe their argument. Concurrent
    /// callers wait for the first one to finish tearing down.
    pub fn close(&self) {
        let _closing = self.inner.closing.lock().unwrap();
        let subs = {
            let mut state = self.inner.state.lock().unwrap();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.subs)
        };

        tracing::debug!(subscriptions = subs.len(), "Closing scope");
        record_scope_close(subs.len());
        for sub in subs.into_values() {
            sub.unsubscribe();
        }
    }

    /// Number of tracked subscriptions that have not terminated.
    pub fn count(&self) -> usize {
        self.inner.state.lock().unwrap().subs.len()
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().unwrap().closed
    }
}

impl ScopeInner {
    fn forget(&self, token: u64) {
        self.state.lock().unwrap().subs.remove(&token);
    }
}

impl fmt::Debug for SubscriptionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock().unwrap();
        f.debug_struct("SubscriptionScope")
            .field("tracked", &state.subs.len())
            .field("closed", &state.closed)
            .finish()
    }
}
