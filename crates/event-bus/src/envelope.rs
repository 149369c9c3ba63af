use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::topic::EventKind;

/// An event envelope: routing metadata plus a payload.
///
/// On the wire the envelope is a JSON object with Go-style field names:
///
/// ```text
/// {"EventKind": 1, "AggregateID": 42, "Timestamp": "2024-05-01T12:00:00Z", "Payload": {...}}
/// ```
///
/// `P` is the payload type. While a message is being routed the payload is
/// kept as undecoded JSON ([`RawEnvelope`]); once a handler is found it is
/// decoded into the handler's payload type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    #[serde(rename = "EventKind")]
    event_kind: EventKind,

    #[serde(rename = "AggregateID")]
    aggregate_id: AggregateId,

    #[serde(rename = "Timestamp")]
    timestamp: DateTime<Utc>,

    #[serde(rename = "Payload")]
    payload: P,
}

/// An envelope whose payload has not been decoded yet.
pub type RawEnvelope = Envelope<Box<RawValue>>;

impl<P> Envelope<P> {
    /// Creates an envelope stamped with the current time.
    pub fn new(event_kind: EventKind, aggregate_id: AggregateId, payload: P) -> Self {
        Self {
            event_kind,
            aggregate_id,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Replaces the timestamp. Useful when re-enveloping a recorded event.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn event_kind(&self) -> EventKind {
        self.event_kind
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    /// Swaps the payload, keeping the metadata.
    pub fn with_payload<Q>(self, payload: Q) -> Envelope<Q> {
        Envelope {
            event_kind: self.event_kind,
            aggregate_id: self.aggregate_id,
            timestamp: self.timestamp,
            payload,
        }
    }
}

impl<P: Serialize> Envelope<P> {
    /// Serializes the envelope into its JSON wire form.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl RawEnvelope {
    /// Parses the envelope header, leaving the payload undecoded.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
