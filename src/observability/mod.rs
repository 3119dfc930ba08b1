//! Observability infrastructure.
//!
//! Provides:
//! - Structured tracing via `tracing-subscriber`
//! - OpenTelemetry metrics for sends, deliveries and teardown

pub mod metrics;
pub mod tracing;
