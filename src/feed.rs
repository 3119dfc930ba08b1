//! Broadcast feed delivering each value to every active subscriber.
//!
//! A [`Feed`] owns the canonical list of consumer channels. Each
//! [`send`](Feed::send) takes a snapshot of that list under the lock, then
//! delivers outside it, so subscribing and unsubscribing never wait on a
//! slow consumer.
//!
//! Delivery to one consumer:
//! 1. Wait for channel capacity, racing the subscription's cancellation
//!    (cancellation wins ties).
//! 2. Commit the value under the subscription's lock, only if it is still
//!    live.
//!
//! Step 2 is what makes `unsubscribe` final: once it returns, no value
//! lands in that consumer's channel. Step 1 is what keeps a blocked `send`
//! from outliving the subscription it is blocked on.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::Error;
use crate::observability::metrics::record_send;
use crate::subscription::Subscription;

/// In-process broadcast channel for values of type `T`.
///
/// The element type is fixed by `T`; subscribing a channel or sending a
/// value of any other type is rejected at compile time. Clones share the
/// same subscriber list.
pub struct Feed<T> {
    inner: Arc<FeedInner<T>>,
}

struct FeedInner<T> {
    targets: Mutex<Vec<Target<T>>>,
    /// Number of `send` calls currently delivering.
    in_flight: AtomicUsize,
}

struct Target<T> {
    sub: Subscription,
    tx: mpsc::Sender<T>,
}

impl<T> Clone for Target<T> {
    fn clone(&self) -> Self {
        Self {
            sub: self.sub.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<T> Feed<T> {
    /// Create a feed with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FeedInner {
                targets: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of active subscribers.
    pub fn len(&self) -> usize {
        self.inner.targets.lock().unwrap().len()
    }

    /// True if nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `send` calls currently delivering.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Vec<Target<T>> {
        self.inner.targets.lock().unwrap().clone()
    }
}

impl<T: Send + 'static> Feed<T> {
    /// Register `tx` as a consumer.
    ///
    /// The channel is included in every `send` that starts after this call
    /// returns, until the returned subscription terminates.
    pub fn subscribe(&self, tx: mpsc::Sender<T>) -> Subscription {
        let sub = Subscription::new();
        let id = sub.id();

        let subscribers = {
            let mut targets = self.inner.targets.lock().unwrap();
            targets.push(Target {
                sub: sub.clone(),
                tx,
            });
            targets.len()
        };

        let feed = Arc::downgrade(&self.inner);
        sub.on_terminate(move || {
            if let Some(feed) = feed.upgrade() {
                feed.remove(id);
            }
        });

        tracing::debug!(subscription = id, subscribers, "Subscribed to feed");
        sub
    }
}

impl<T: Clone + Send + 'static> Feed<T> {
    /// Deliver `value` to every subscriber active when the call starts.
    ///
    /// Waits until each of them has accepted the value or terminated.
    /// Deliveries to different subscribers proceed concurrently; values
    /// sent by one producer arrive at each subscriber in send order.
    ///
    /// Returns the number of subscribers that received the value.
    pub async fn send(&self, value: T) -> usize {
        let start = Instant::now();
        let targets = self.snapshot();
        if targets.is_empty() {
            return 0;
        }

        let _in_flight = InFlight::enter(&self.inner.in_flight);
        let delivered = join_all(targets.iter().map(|target| target.deliver(value.clone())))
            .await
            .into_iter()
            .filter(|accepted| *accepted)
            .count();

        let latency = start.elapsed().as_secs_f64();
        record_send(delivered, latency);
        tracing::trace!(
            subscribers = targets.len(),
            delivered,
            latency_ms = latency * 1000.0,
            "Value sent"
        );
        delivered
    }

    /// Deliver `value` without waiting.
    ///
    /// Subscribers whose channel is full miss this value. Returns the number
    /// of subscribers that received it.
    pub fn try_send(&self, value: T) -> usize {
        let start = Instant::now();
        let targets = self.snapshot();
        let mut delivered = 0;

        for target in &targets {
            match target.tx.try_reserve() {
                Ok(permit) => {
                    if target.sub.commit(|| permit.send(value.clone())) {
                        delivered += 1;
                    }
                }
                Err(TrySendError::Full(())) => {
                    tracing::trace!(subscription = target.sub.id(), "Subscriber full, value dropped");
                }
                Err(TrySendError::Closed(())) => target.receiver_dropped(),
            }
        }

        if !targets.is_empty() {
            record_send(delivered, start.elapsed().as_secs_f64());
        }
        delivered
    }
}

impl<T> Target<T> {
    async fn deliver(&self, value: T) -> bool {
        let permit = tokio::select! {
            biased;
            () = self.sub.cancelled() => return false,
            reserved = self.tx.reserve() => match reserved {
                Ok(permit) => permit,
                Err(_) => {
                    self.receiver_dropped();
                    return false;
                }
            },
        };

        self.sub.commit(|| permit.send(value))
    }

    fn receiver_dropped(&self) {
        if self.sub.terminate(Some(Error::ReceiverDropped)) {
            tracing::warn!(
                subscription = self.sub.id(),
                "Subscriber receiver dropped, subscription terminated"
            );
        }
    }
}

impl<T> FeedInner<T> {
    fn remove(&self, id: u64) {
        let mut targets = self.targets.lock().unwrap();
        targets.retain(|target| target.sub.id() != id);
        tracing::debug!(subscription = id, subscribers = targets.len(), "Removed from feed");
    }
}

impl<T> Drop for FeedInner<T> {
    fn drop(&mut self) {
        let targets = std::mem::take(
            self.targets
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for target in targets {
            target.sub.terminate(Some(Error::FeedDropped));
        }
    }
}

/// Counts a `send` as in flight for as long as it is alive.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T> Clone for Feed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Feed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Feed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feed")
            .field("subscribers", &self.len())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
