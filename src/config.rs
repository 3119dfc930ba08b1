//! Configuration parsing for the eventfeed demo binary.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::{Parser, ValueEnum};

/// Which demonstration to run.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Run every scenario in turn.
    All,
    /// Three feeds sharing one listener and one scope.
    Scope,
    /// Calculator app whose stop method closes all result subscriptions.
    Calc,
}

/// Eventfeed: in-process broadcast feeds with scoped teardown.
#[derive(Parser, Debug, Clone)]
#[command(name = "eventfeed")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Capacity of each subscriber channel (1 is closest to a rendezvous)
    #[arg(
        short,
        long,
        env = "EVENTFEED_CHANNEL_CAPACITY",
        default_value_t = 1,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub channel_capacity: u16,

    /// Scenario to run
    #[arg(short, long, env = "EVENTFEED_SCENARIO", value_enum, default_value_t = Scenario::All)]
    pub scenario: Scenario,

    /// OpenTelemetry collector endpoint for metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Subscriber channel capacity as a `usize`.
    pub fn capacity(&self) -> usize {
        usize::from(self.channel_capacity)
    }

    /// Whether `scenario` should run under this configuration.
    pub fn runs(&self, scenario: Scenario) -> bool {
        self.scenario == Scenario::All || self.scenario == scenario
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            channel_capacity: 1,
            scenario: Scenario::All,
            otel_endpoint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.capacity(), 1);
        assert!(config.runs(Scenario::Scope));
        assert!(config.runs(Scenario::Calc));
    }

    #[test]
    fn test_parse_scenario_and_capacity() {
        let config =
            Config::try_parse_from(["eventfeed", "--scenario", "calc", "--channel-capacity", "8"])
                .expect("valid arguments rejected");
        assert_eq!(config.capacity(), 8);
        assert!(config.runs(Scenario::Calc));
        assert!(!config.runs(Scenario::Scope));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(Config::try_parse_from(["eventfeed", "--channel-capacity", "0"]).is_err());
    }
}
