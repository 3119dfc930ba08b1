//! Demonstration applications built on feeds and scopes.
//!
//! - [`CalcApp`]: two calculation servers that publish their results on
//!   feeds, wrapped in an app whose `stop` closes every result
//!   subscription handed out.
//! - [`multi_feed_scope`]: one listener subscribed to three feeds through
//!   a single scope.
//! - [`calculator`]: a listener driven by [`CalcApp`] until the app stops.

use std::fmt;

use anyhow::{anyhow, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;

use crate::feed::Feed;
use crate::scope::SubscriptionScope;
use crate::subscription::Subscription;

/// Operations supported by [`CalcApp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Integer division, published on the division server's feed.
    Div,
    /// Multiplication, published on the multiplication server's feed.
    Mul,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Div => f.write_str("/"),
            Self::Mul => f.write_str("*"),
        }
    }
}

#[derive(Default)]
struct DivServer {
    results: Feed<i64>,
}

impl DivServer {
    async fn run(&self, a: i64, b: i64) -> Result<i64> {
        let r = a.checked_div(b).ok_or_else(|| anyhow!("cannot divide {a} by {b}"))?;
        self.results.send(r).await;
        Ok(r)
    }
}

#[derive(Default)]
struct MulServer {
    results: Feed<i64>,
}

impl MulServer {
    async fn run(&self, a: i64, b: i64) -> Result<i64> {
        let r = a.checked_mul(b).ok_or_else(|| anyhow!("{a} * {b} overflows"))?;
        self.results.send(r).await;
        Ok(r)
    }
}

/// App owning two calculation servers.
///
/// Result subscriptions handed out by [`subscribe_results`] live no longer
/// than the app: [`stop`] closes all of them.
///
/// [`subscribe_results`]: CalcApp::subscribe_results
/// [`stop`]: CalcApp::stop
#[derive(Default)]
pub struct CalcApp {
    div: DivServer,
    mul: MulServer,
    scope: SubscriptionScope,
}

impl CalcApp {
    /// Create an app with both servers idle and no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute `a op b` and publish the result to that operation's subscribers.
    #[tracing::instrument(skip(self))]
    pub async fn calc(&self, op: Op, a: i64, b: i64) -> Result<i64> {
        match op {
            Op::Div => self.div.run(a, b).await,
            Op::Mul => self.mul.run(a, b).await,
        }
    }

    /// Stream results of `op` into `tx` until the app stops.
    pub fn subscribe_results(&self, op: Op, tx: mpsc::Sender<i64>) -> Subscription {
        match op {
            Op::Div => self.scope.track(self.div.results.subscribe(tx)),
            Op::Mul => self.scope.track(self.mul.results.subscribe(tx)),
        }
    }

    /// Number of live result subscriptions.
    pub fn subscriptions(&self) -> usize {
        self.scope.count()
    }

    /// Close every result subscription.
    pub fn stop(&self) {
        tracing::info!(subscriptions = self.scope.count(), "Stopping calculator app");
        self.scope.close();
    }
}

/// What the listener in [`multi_feed_scope`] observed.
#[derive(Debug, Default, Clone)]
pub struct ScopeReport {
    /// Values in the order the listener received them.
    pub received: Vec<i64>,
    /// Feed numbers (1-based) whose subscription terminated.
    pub closed: Vec<usize>,
    /// `count()` after tracking, after unsubscribing feed 1, after closing.
    pub counts: Vec<usize>,
    /// Subscribers reached by a send on feed 1 after it was unsubscribed.
    pub late_delivered: usize,
}

/// Three feeds, one listener channel, one scope.
///
/// Sends 1, 2, 3 on the three feeds, unsubscribes feed 1 directly, sends 4
/// on feed 1, then closes the scope. The listener exits once every
/// subscription has terminated and its channel is drained.
pub async fn multi_feed_scope(capacity: usize) -> Result<ScopeReport> {
    let feeds: [Feed<i64>; 3] = Default::default();
    let scope = SubscriptionScope::new();
    let (tx, mut rx) = mpsc::channel(capacity);

    let subs: Vec<Subscription> = feeds
        .iter()
        .map(|feed| scope.track(feed.subscribe(tx.clone())))
        .collect();
    drop(tx);

    let mut closed: FuturesUnordered<_> = subs
        .iter()
        .enumerate()
        .map(|(index, sub)| {
            let err = sub.err();
            async move { (index + 1, err.await) }
        })
        .collect();

    let listener = tokio::spawn(async move {
        let mut report = ScopeReport::default();
        loop {
            tokio::select! {
                biased;
                Some(value) = rx.recv() => {
                    tracing::info!(value, "Listener received value");
                    report.received.push(value);
                }
                Some((feed, reason)) = closed.next() => {
                    tracing::info!(feed, reason = ?reason, "Feed subscription closed");
                    report.closed.push(feed);
                }
                else => break,
            }
        }
        report
    });

    let mut counts = vec![scope.count()];
    for (feed, value) in feeds.iter().zip(1..) {
        feed.send(value).await;
    }

    subs[0].unsubscribe();
    counts.push(scope.count());
    let late_delivered = feeds[0].send(4).await;

    scope.close();
    counts.push(scope.count());

    let mut report = listener.await?;
    report.counts = counts;
    report.late_delivered = late_delivered;
    Ok(report)
}

/// Drive a [`CalcApp`] with one listener and return what it printed.
pub async fn calculator(capacity: usize) -> Result<Vec<String>> {
    let app = CalcApp::new();
    let (div_tx, mut divs) = mpsc::channel(capacity);
    let (mul_tx, mut muls) = mpsc::channel(capacity);

    let divsub = app.subscribe_results(Op::Div, div_tx);
    let mulsub = app.subscribe_results(Op::Mul, mul_tx);

    let listener = tokio::spawn(async move {
        let mut lines = Vec::new();
        let div_err = divsub.err();
        let mul_err = mulsub.err();
        tokio::pin!(div_err, mul_err);

        loop {
            tokio::select! {
                biased;
                Some(result) = divs.recv() => lines.push(format!("division happened: {result}")),
                Some(result) = muls.recv() => lines.push(format!("multiplication happened: {result}")),
                _ = &mut div_err => break,
                _ = &mut mul_err => break,
            }
        }

        divsub.unsubscribe();
        mulsub.unsubscribe();
        lines.push("subscriber exited".to_string());
        lines
    });

    app.calc(Op::Div, 22, 11).await?;
    app.calc(Op::Mul, 3, 4).await?;
    app.stop();

    Ok(listener.await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_calc_results() {
        let app = CalcApp::new();
        assert_eq!(app.calc(Op::Div, 22, 11).await.unwrap(), 2);
        assert_eq!(app.calc(Op::Mul, 3, 4).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_calc_rejects_division_by_zero() {
        let app = CalcApp::new();
        let (tx, mut rx) = mpsc::channel(1);
        let _sub = app.subscribe_results(Op::Div, tx);

        assert!(app.calc(Op::Div, 1, 0).await.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribe_results_routes_by_op() {
        let app = CalcApp::new();
        let (div_tx, mut divs) = mpsc::channel(1);
        let (mul_tx, mut muls) = mpsc::channel(1);
        let _d = app.subscribe_results(Op::Div, div_tx);
        let _m = app.subscribe_results(Op::Mul, mul_tx);
        assert_eq!(app.subscriptions(), 2);

        app.calc(Op::Mul, 6, 7).await.unwrap();

        assert_eq!(muls.recv().await, Some(42));
        assert!(divs.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_ends_subscriptions() {
        let app = CalcApp::new();
        let (tx, _rx) = mpsc::channel(1);
        let sub = app.subscribe_results(Op::Div, tx);

        app.stop();

        assert!(sub.err().await.is_none());
        assert_eq!(app.subscriptions(), 0);

        // Subscribing after stop hands back a dead subscription.
        let (tx, _rx) = mpsc::channel(1);
        let late = app.subscribe_results(Op::Mul, tx);
        assert!(late.is_terminated());
    }
}
