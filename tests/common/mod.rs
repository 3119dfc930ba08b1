//! Shared helpers for eventfeed integration tests.
//!
//! Provides:
//! - Test tracing setup
//! - Polling and timeout helpers

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

/// Default upper bound for anything a test waits on.
pub const TIMEOUT: Duration = Duration::from_secs(2);

/// Install a quiet tracing subscriber; safe to call from every test.
pub fn init() {
    eventfeed::observability::tracing::init_test_tracing();
}

/// Wait for a condition to become true with timeout.
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Await `fut`, failing the test if it takes longer than [`TIMEOUT`].
pub async fn within<F: Future>(what: &str, fut: F) -> F::Output {
    tokio::time::timeout(TIMEOUT, fut)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}
