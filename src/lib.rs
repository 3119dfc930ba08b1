//! Eventfeed: in-process broadcast feeds with scoped subscription teardown.
//!
//! A [`Feed`] fans each value out to every subscribed channel. Each
//! subscription is represented by a [`Subscription`] handle that can be
//! cancelled and awaited for termination. A [`SubscriptionScope`] collects
//! subscriptions from any number of feeds and closes them together.
//!
//! # Architecture
//!
//! - **Typed feeds**: the element type is a generic parameter, so type
//!   mismatches are compile errors
//! - **Type-erased subscriptions**: one handle type for every feed, so scopes
//!   stay feed-agnostic
//! - **Deterministic teardown**: unsubscribe is idempotent, final, and
//!   always resolves a blocked send
//! - **Observable**: `tracing` events and OpenTelemetry metrics
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration for the demo binary
//! - [`demo`]: Example applications wired with feeds and scopes
//! - [`error`]: Termination reasons
//! - [`feed`]: Broadcast feed
//! - [`observability`]: Metrics and tracing setup
//! - [`scope`]: Subscription scope
//! - [`subscription`]: Subscription handle
//!
//! # Example
//!
//! ```
//! use eventfeed::{Feed, SubscriptionScope};
//! use tokio::sync::mpsc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let feed = Feed::new();
//! let scope = SubscriptionScope::new();
//! let (tx, mut rx) = mpsc::channel(1);
//! let sub = scope.track(feed.subscribe(tx));
//!
//! assert_eq!(feed.send(42).await, 1);
//! assert_eq!(rx.recv().await, Some(42));
//!
//! scope.close();
//! assert!(sub.err().await.is_none());
//! # }
//! ```

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // scope::SubscriptionScope is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc       // Lock poisoning panics are not documented
)]

pub mod config;
pub mod demo;
pub mod error;
pub mod feed;
pub mod observability;
pub mod scope;
pub mod subscription;

pub use error::Error;
pub use feed::Feed;
pub use scope::SubscriptionScope;
pub use subscription::Subscription;
