//! Worker error types.

use event_bus::{ConsumerError, PublishError, RegistryError};
use thiserror::Error;

/// Errors that stop the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Two handlers claimed the same topic and event kind.
    #[error("Handler registration failed: {0}")]
    Registry(#[from] RegistryError),

    /// A consumer group stopped with an error.
    #[error("Consumer group failed: {0}")]
    Consumer(#[from] ConsumerError),

    /// A publisher could not be closed cleanly.
    #[error("Publisher close failed: {0}")]
    Publish(#[from] PublishError),

    /// A background task panicked or was aborted.
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The Prometheus exporter could not be installed.
    #[error("Metrics exporter failed: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
