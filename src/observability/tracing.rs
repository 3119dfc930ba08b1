//! Structured logging setup for the demo binary and the test suites.
//!
//! Feed, subscription and scope lifecycle events are emitted at `debug`
//! (subscribe, unsubscribe, track, close) and `trace` (each send), with the
//! subscription id as a structured field. Dropped receivers are `warn`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber for the eventfeed binary.
///
/// `RUST_LOG` takes precedence when set; otherwise `level` applies to every
/// target, including the `eventfeed` lifecycle events.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},eventfeed={level}")));

    // Thread ids matter here: sends, unsubscribes and scope closes race
    // across runtime workers and blocking threads.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    tracing::info!(level, "Tracing initialized");
}

/// Route lifecycle warnings into the test harness output.
///
/// Keeps `eventfeed` warnings (such as dropped receivers) visible and
/// everything else at `error`. Safe to call from every test; only the first
/// call installs a subscriber.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error,eventfeed=warn")
        .with_test_writer()
        .try_init();
}
