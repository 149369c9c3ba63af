//! Typed event dispatch over a partitioned message bus.
//!
//! This crate provides:
//! - [`Envelope`], the wire wrapper carried on every topic
//! - [`topic_events!`] and [`TopicEvent`] for declaring a topic's payload kinds
//! - [`RegistryBuilder`] / [`Registry`] binding typed handlers to `(topic, kind)` pairs
//! - [`Publisher`] for synchronous, acknowledged sends
//! - [`ConsumerGroup`], the runtime that claims partitions, dispatches and commits
//! - [`InMemoryBroker`], an in-process partitioned log implementing the broker traits

pub mod broker;
pub mod config;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod publisher;
pub mod registry;
pub mod topic;

pub use broker::{GroupConsumer, Message, PartitionClaim, Producer, Record, RecordMetadata};
pub use common::AggregateId;
pub use config::{ConsumerConfig, MIN_REBALANCE_DELAY, ProducerConfig};
pub use consumer::{ConsumerGroup, RuntimeState};
pub use envelope::{Envelope, RawEnvelope};
pub use error::{
    BrokerError, ConsumerError, DispatchError, PayloadError, PublishError, RegistryError,
};
pub use memory::{InMemoryBroker, InMemoryConsumer, InMemoryProducer};
pub use publisher::Publisher;
pub use registry::{
    Dispatched, EventHandler, HandlerError, RawHandler, Registry, RegistryBuilder, RegistryKey,
    TypedHandler, wrap,
};
pub use topic::{EventKind, TopicEvent};
