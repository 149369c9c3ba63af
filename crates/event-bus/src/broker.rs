//! Broker client contracts.
//!
//! The runtime talks to the message bus only through [`Producer`] and
//! [`GroupConsumer`], so any partitioned log with consumer-group offsets can
//! back it. [`InMemoryBroker`](crate::memory::InMemoryBroker) is the
//! in-process implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use tokio::sync::mpsc;

use crate::error::BrokerError;

/// A record to be appended to a topic.
#[derive(Debug, Clone)]
pub struct Record {
    pub topic: String,
    /// Partitioning key. Records with the same key land on the same partition.
    pub key: AggregateId,
    pub value: Vec<u8>,
}

/// Where the broker stored an acknowledged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMetadata {
    pub partition: i32,
    pub offset: i64,
}

/// A record read back from a partition.
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: AggregateId,
    pub value: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

/// The messages of one partition handed to a consumer for one session,
/// in partition order, starting at the group's committed offset.
#[derive(Debug, Clone)]
pub struct PartitionClaim {
    pub topic: String,
    pub partition: i32,
    pub messages: Vec<Message>,
}

/// Producer side of a broker client.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Appends a record and resolves once the broker has acknowledged it.
    async fn send(&self, record: Record) -> Result<RecordMetadata, BrokerError>;

    /// Releases the producer. Further sends fail with [`BrokerError::Closed`].
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Consumer-group side of a broker client.
#[async_trait]
pub trait GroupConsumer: Send + Sync {
    /// The consumer group this client belongs to.
    fn group_id(&self) -> &str;

    /// Joins a session for `topics` and blocks until at least one assigned
    /// partition has uncommitted messages.
    ///
    /// Dropping the returned future before it resolves must be safe.
    async fn claim(&self, topics: &[String]) -> Result<Vec<PartitionClaim>, BrokerError>;

    /// Marks `message` as processed for the group.
    async fn commit(&self, message: &Message) -> Result<(), BrokerError>;

    /// Takes the receiver of broker-level error notifications.
    ///
    /// Returns `None` once taken.
    fn take_errors(&self) -> Option<mpsc::Receiver<BrokerError>>;

    /// Leaves the group and releases the client.
    async fn close(&self) -> Result<(), BrokerError>;
}
