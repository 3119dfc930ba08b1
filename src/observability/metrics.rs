//! OpenTelemetry metrics for feed and scope activity.
//!
//! Key metrics:
//! - eventfeed_send_total: Counter for send operations that reached a subscriber list
//! - eventfeed_delivered_total: Counter for values accepted by subscribers
//! - eventfeed_send_latency_seconds: Histogram for fan-out latency
//! - eventfeed_unsubscribe_total: Counter for terminated subscriptions, by reason
//! - eventfeed_scope_close_total: Counter for subscriptions closed by scopes

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Eventfeed metrics registry.
#[derive(Debug)]
pub struct Metrics {
    /// Total number of send operations with at least one subscriber.
    pub send_total: Counter<u64>,
    /// Total number of values delivered to subscribers.
    pub delivered_total: Counter<u64>,
    /// Histogram of fan-out latency in seconds.
    pub send_latency: Histogram<f64>,
    /// Total number of terminated subscriptions.
    pub unsubscribe_total: Counter<u64>,
    /// Total number of subscriptions closed through a scope.
    pub scope_close_total: Counter<u64>,
}

impl Metrics {
    fn new(meter: &Meter) -> Self {
        Self {
            send_total: meter
                .u64_counter("eventfeed_send_total")
                .with_description("Total number of send operations")
                .with_unit("1")
                .init(),
            delivered_total: meter
                .u64_counter("eventfeed_delivered_total")
                .with_description("Total number of values accepted by subscribers")
                .with_unit("1")
                .init(),
            send_latency: meter
                .f64_histogram("eventfeed_send_latency_seconds")
                .with_description("Time from send to the last subscriber accepting")
                .with_unit("s")
                .init(),
            unsubscribe_total: meter
                .u64_counter("eventfeed_unsubscribe_total")
                .with_description("Terminated subscriptions by reason")
                .with_unit("1")
                .init(),
            scope_close_total: meter
                .u64_counter("eventfeed_scope_close_total")
                .with_description("Subscriptions unsubscribed by closing a scope")
                .with_unit("1")
                .init(),
        }
    }
}

/// Initialize the metrics system.
///
/// This should be called once at startup. Subsequent calls are ignored.
///
/// # Arguments
///
/// * `otel_endpoint` - Optional OTLP endpoint for metrics export
pub fn init_metrics_with_endpoint(otel_endpoint: Option<&str>) {
    METRICS.get_or_init(|| {
        if let Some(endpoint) = otel_endpoint {
            use opentelemetry_otlp::{Protocol, WithExportConfig};

            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_protocol(Protocol::Grpc);

            match opentelemetry_otlp::new_pipeline()
                .metrics(opentelemetry_sdk::runtime::Tokio)
                .with_exporter(exporter)
                .with_period(std::time::Duration::from_secs(10))
                .build()
            {
                Ok(provider) => {
                    global::set_meter_provider(provider);
                    tracing::info!(endpoint, "OTLP metrics exporter configured");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create OTLP exporter, using no-op metrics");
                    install_manual_reader();
                }
            }
        } else {
            // Recorded but not exported.
            install_manual_reader();
        }

        let meter = global::meter("eventfeed");
        Metrics::new(&meter)
    });
}

fn install_manual_reader() {
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    global::set_meter_provider(provider);
}

/// Initialize the metrics system without OTLP export.
pub fn init_metrics() {
    init_metrics_with_endpoint(None);
}

/// Get the global metrics instance.
///
/// Panics if metrics have not been initialized.
pub fn metrics() -> &'static Metrics {
    METRICS
        .get()
        .expect("metrics not initialized - call init_metrics() first")
}

/// Record a fan-out to a non-empty subscriber list.
pub fn record_send(delivered: usize, latency_seconds: f64) {
    if let Some(m) = METRICS.get() {
        m.send_total.add(1, &[]);
        m.delivered_total.add(delivered as u64, &[]);
        m.send_latency.record(latency_seconds, &[]);
    }
}

/// Record a terminated subscription.
pub fn record_unsubscribe(reason: &'static str) {
    if let Some(m) = METRICS.get() {
        m.unsubscribe_total
            .add(1, &[KeyValue::new("reason", reason)]);
    }
}

/// Record a scope close.
pub fn record_scope_close(subscriptions: usize) {
    if let Some(m) = METRICS.get() {
        m.scope_close_total.add(subscriptions as u64, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_idempotent() {
        init_metrics();
        init_metrics();
        let _ = metrics();
    }

    #[test]
    fn test_record_functions() {
        init_metrics();
        // Should not panic
        record_send(3, 0.001);
        record_unsubscribe("unsubscribe");
        record_scope_close(2);
    }
}
