use std::sync::atomic::{AtomicBool, Ordering};

use common::AggregateId;
use serde::Serialize;

use crate::broker::{Producer, Record, RecordMetadata};
use crate::envelope::Envelope;
use crate::error::PublishError;
use crate::topic::{EventKind, TopicEvent};

/// Publishes enveloped events to topics.
///
/// Each call sends synchronously: it returns only after the broker has
/// acknowledged the record. Nothing is buffered or retried; failures are
/// returned to the caller as-is.
///
/// The publisher owns its producer handle. Call [`close`](Self::close) on
/// shutdown; closing more than once is harmless.
pub struct Publisher<P: Producer> {
    producer: P,
    closed: AtomicBool,
}

impl<P: Producer> Publisher<P> {
    pub fn new(producer: P) -> Self {
        Self {
            producer,
            closed: AtomicBool::new(false),
        }
    }

    /// Envelopes `payload` and sends it to `topic`, keyed by `aggregate_id`.
    #[tracing::instrument(skip_all, fields(%topic, %kind, %aggregate_id))]
    pub async fn publish<T: Serialize + Sync>(
        &self,
        topic: &str,
        kind: EventKind,
        aggregate_id: AggregateId,
        payload: &T,
    ) -> Result<RecordMetadata, PublishError> {
        if self.is_closed() {
            return Err(PublishError::Closed);
        }

        let value = Envelope::new(kind, aggregate_id, payload).to_vec()?;
        let metadata = self
            .producer
            .send(Record {
                topic: topic.to_string(),
                key: aggregate_id,
                value,
            })
            .await?;

        metrics::counter!("publisher_messages_published", "topic" => topic.to_string())
            .increment(1);
        tracing::debug!(
            partition = metadata.partition,
            offset = metadata.offset,
            "event published"
        );

        Ok(metadata)
    }

    /// Publishes a topic payload using its own topic and kind.
    pub async fn publish_event<T: TopicEvent>(
        &self,
        aggregate_id: AggregateId,
        event: &T,
    ) -> Result<RecordMetadata, PublishError> {
        self.publish(T::TOPIC, event.kind(), aggregate_id, event)
            .await
    }

    /// Releases the producer. Only the first call reaches the broker.
    pub async fn close(&self) -> Result<(), PublishError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.producer.close().await?;
        tracing::info!("publisher closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
