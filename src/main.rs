//! Eventfeed demo: broadcast feeds with scoped subscription teardown.
//!
//! # Usage
//!
//! ```bash
//! eventfeed --scenario all --channel-capacity 1 --log-level info
//! ```
//!
//! Environment variables can also be used:
//! - `EVENTFEED_SCENARIO`: Scenario to run (all, scope, calc)
//! - `EVENTFEED_CHANNEL_CAPACITY`: Capacity of each subscriber channel
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use eventfeed::config::{Config, Scenario};
use eventfeed::demo::{calculator, multi_feed_scope};
use eventfeed::observability::metrics::init_metrics_with_endpoint;
use eventfeed::observability::tracing::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    init_tracing(&config.log_level);
    init_metrics_with_endpoint(config.otel_endpoint.as_deref());

    tracing::info!(
        scenario = ?config.scenario,
        channel_capacity = config.channel_capacity,
        "Starting eventfeed demo"
    );

    if config.runs(Scenario::Scope) {
        let report = multi_feed_scope(config.capacity()).await?;
        println!("subscribe feed count {}", report.counts[0]);
        for value in &report.received {
            println!("{value}");
        }
        println!("subscribe feed count {}", report.counts[1]);
        println!("late send on feed1 reached {} subscribers", report.late_delivered);
        for feed in &report.closed {
            println!("feed{feed} close");
        }
        println!("subscribe feed count {}", report.counts[2]);
    }

    if config.runs(Scenario::Calc) {
        for line in calculator(config.capacity()).await? {
            println!("{line}");
        }
    }

    tracing::info!("Eventfeed demo complete");
    Ok(())
}
