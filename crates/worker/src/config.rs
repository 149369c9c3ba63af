//! Worker configuration loaded from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use event_bus::config::DEFAULT_BROKER;
use event_bus::{ConsumerConfig, ProducerConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `BROKERS`: comma separated broker addresses (default: `"localhost:9092"`)
/// - `PARTITIONS`: partitions per topic (default: `3`)
/// - `ERROR_BUFFER`: consumer error channel capacity (default: `64`)
/// - `REBALANCE_DELAY_MS`: pause after a failed session, at least 1 (default: `100`)
/// - `METRICS_PORT`: Prometheus listener port (default: `9000`)
/// - `LOG_FORMAT`: `json` for JSON lines, anything else for text
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub brokers: Vec<String>,
    pub partitions: u32,
    pub error_buffer: usize,
    pub rebalance_delay: Duration,
    pub metrics_port: u16,
    pub log_format: LogFormat,
    pub log_level: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`. Unset or unparsable values fall
    /// back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let brokers = lookup("BROKERS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|broker| !broker.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|brokers| !brokers.is_empty())
            .unwrap_or(defaults.brokers);

        Self {
            brokers,
            partitions: parse::<u32>(&lookup, "PARTITIONS")
                .filter(|partitions| *partitions > 0)
                .unwrap_or(defaults.partitions),
            error_buffer: parse::<usize>(&lookup, "ERROR_BUFFER").unwrap_or(defaults.error_buffer),
            rebalance_delay: parse::<u64>(&lookup, "REBALANCE_DELAY_MS")
                .filter(|millis| *millis > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.rebalance_delay),
            metrics_port: parse::<u16>(&lookup, "METRICS_PORT").unwrap_or(defaults.metrics_port),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }

    /// Returns the address the metrics endpoint listens on.
    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.metrics_port))
    }

    pub fn producer_config(&self) -> ProducerConfig {
        ProducerConfig::default()
            .with_brokers(self.brokers.clone())
            .with_partitions(self.partitions)
    }

    pub fn consumer_config(&self, group_id: &str) -> ConsumerConfig {
        ConsumerConfig::new(group_id)
            .with_brokers(self.brokers.clone())
            .with_error_buffer(self.error_buffer)
            .with_rebalance_delay(self.rebalance_delay)
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            brokers: vec![DEFAULT_BROKER.to_string()],
            partitions: 3,
            error_buffer: 64,
            rebalance_delay: Duration::from_millis(100),
            metrics_port: 9000,
            log_format: LogFormat::Text,
            log_level: "info".to_string(),
        }
    }
}
