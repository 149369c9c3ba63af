//! Producer and consumer configuration.

use std::time::Duration;

/// Default broker address list.
pub const DEFAULT_BROKER: &str = "localhost:9092";

/// Producer settings.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Broker addresses.
    pub brokers: Vec<String>,

    /// Number of partitions per topic.
    /// Default: 3
    pub partitions: u32,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: vec![DEFAULT_BROKER.to_string()],
            partitions: 3,
        }
    }
}

impl ProducerConfig {
    pub fn with_brokers(mut self, brokers: Vec<String>) -> Self {
        self.brokers = brokers;
        self
    }

    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = partitions;
        self
    }
}

/// Shortest pause allowed between a failed session and the next claim.
pub const MIN_REBALANCE_DELAY: Duration = Duration::from_millis(1);

/// Consumer-group runtime settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Consumer group id, one per service (e.g. `"delivery-svc"`).
    pub group_id: String,

    /// Broker addresses.
    pub brokers: Vec<String>,

    /// Capacity of the error-notification channel. When the channel is full,
    /// new notifications are dropped and logged.
    /// Default: 64
    pub error_buffer: usize,

    /// Pause between a failed session and the next claim.
    /// Default: 100 ms
    pub rebalance_delay: Duration,
}

impl ConsumerConfig {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            brokers: vec![DEFAULT_BROKER.to_string()],
            error_buffer: 64,
            rebalance_delay: Duration::from_millis(100),
        }
    }

    pub fn with_brokers(mut self, brokers: Vec<String>) -> Self {
        self.brokers = brokers;
        self
    }

    /// Sets the error channel capacity. Zero is raised to one.
    pub fn with_error_buffer(mut self, capacity: usize) -> Self {
        self.error_buffer = capacity.max(1);
        self
    }

    /// Sets the pause after a failed session. It is never shorter than
    /// [`MIN_REBALANCE_DELAY`].
    pub fn with_rebalance_delay(mut self, delay: Duration) -> Self {
        self.rebalance_delay = delay.max(MIN_REBALANCE_DELAY);
        self
    }
}
