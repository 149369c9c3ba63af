use thiserror::Error;

use crate::consumer::RuntimeState;
use crate::registry::{HandlerError, RegistryKey};
use crate::topic::EventKind;

/// Errors raised while decoding a payload into a topic's payload union.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The topic does not declare a payload for this event kind.
    #[error("Unknown event kind {kind} on topic {topic}")]
    UnknownKind { topic: &'static str, kind: EventKind },

    /// The payload JSON does not match the shape declared for the kind.
    #[error("Malformed payload for event kind {kind} on topic {topic}: {source}")]
    Malformed {
        topic: &'static str,
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while building a handler registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A handler is already registered for this `(topic, kind)` pair.
    #[error("Duplicate registration for {key}: already bound to {existing}")]
    DuplicateRegistration {
        key: RegistryKey,
        existing: &'static str,
    },
}

/// Errors raised while routing an envelope to its handler.
///
/// Decode and handler failures are tagged separately so callers can apply
/// different retry policies to each.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The raw payload could not be decoded into the registered shape.
    #[error("Decode error: {0}")]
    Decode(#[from] PayloadError),

    /// The decoded payload is not the type the handler was registered for.
    #[error("Type mismatch for {key}: handler expects {expected}, payload decoded as {found}")]
    TypeMismatch {
        key: RegistryKey,
        expected: &'static str,
        found: &'static str,
    },

    /// The handler itself failed.
    #[error("Handler error for {key}: {source}")]
    Handler {
        key: RegistryKey,
        #[source]
        source: HandlerError,
    },
}

/// Errors reported by a broker client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The client or broker has been closed.
    #[error("Broker client is closed")]
    Closed,

    /// The broker could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A consumer-group rebalance failed.
    #[error("Rebalance error in group {group_id}: {reason}")]
    Rebalance { group_id: String, reason: String },
}

/// Errors returned by the publisher.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The envelope could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker rejected or failed to acknowledge the record.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// The publisher was closed before the call.
    #[error("Publisher is closed")]
    Closed,
}

/// Errors surfaced by the consumer-group runtime.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The message body is not a valid envelope.
    #[error("Malformed envelope at {topic}[{partition}]@{offset}: {source}")]
    Envelope {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: serde_json::Error,
    },

    /// Dispatch failed; the message was not committed.
    #[error("Dispatch failed at {topic}[{partition}]@{offset}: {source}")]
    Dispatch {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: DispatchError,
    },

    /// The message was handled but its offset could not be committed.
    #[error("Commit failed at {topic}[{partition}]@{offset}: {source}")]
    Commit {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: BrokerError,
    },

    /// A broker-level failure (connectivity, rebalance, claim).
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// `run` was called on a runtime that is not idle.
    #[error("Consumer runtime is {0}, expected Idle")]
    NotIdle(RuntimeState),
}
