use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use common::AggregateId;
use tokio::sync::{Notify, RwLock, mpsc};
use uuid::Uuid;

use crate::broker::{GroupConsumer, Message, PartitionClaim, Producer, Record, RecordMetadata};
use crate::config::ProducerConfig;
use crate::error::BrokerError;

/// Capacity of each consumer's broker-error channel.
const BROKER_ERROR_BUFFER: usize = 16;

/// (group id, topic, partition)
type OffsetKey = (String, String, i32);

#[derive(Default)]
struct BrokerState {
    logs: HashMap<String, Vec<Vec<Message>>>,
    committed: HashMap<OffsetKey, i64>,
    closed: bool,
}

struct Inner {
    state: RwLock<BrokerState>,
    appended: Notify,
    partitions: u32,
}

/// In-process partitioned log with consumer-group offsets.
///
/// Topics are created on first write. Records are assigned to partitions by
/// key, so every event of one aggregate stays in order. Each consumer group
/// tracks its own committed offset per partition; a claim hands out
/// everything past that offset, so uncommitted messages are redelivered on
/// the next claim.
///
/// Every member of a group is assigned every partition. Run one member per
/// group.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    /// Creates a broker with `partitions` partitions per topic (at least one).
    pub fn new(partitions: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(BrokerState::default()),
                appended: Notify::new(),
                partitions: partitions.max(1),
            }),
        }
    }

    pub fn from_config(config: &ProducerConfig) -> Self {
        tracing::info!(
            brokers = ?config.brokers,
            partitions = config.partitions,
            "starting in-process broker"
        );
        Self::new(config.partitions)
    }

    pub fn partitions(&self) -> u32 {
        self.inner.partitions
    }

    /// Partition a key is written to.
    pub fn partition_for(&self, key: AggregateId) -> i32 {
        key.as_i64().rem_euclid(i64::from(self.inner.partitions)) as i32
    }

    pub fn producer(&self) -> InMemoryProducer {
        InMemoryProducer {
            broker: self.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn consumer(&self, group_id: impl Into<String>) -> InMemoryConsumer {
        let (errors_tx, errors_rx) = mpsc::channel(BROKER_ERROR_BUFFER);
        InMemoryConsumer {
            broker: self.clone(),
            group_id: group_id.into(),
            member_id: Uuid::new_v4(),
            errors_tx,
            errors_rx: Mutex::new(Some(errors_rx)),
            closed: AtomicBool::new(false),
        }
    }

    /// Total number of messages written to `topic`.
    pub async fn message_count(&self, topic: &str) -> usize {
        let state = self.inner.state.read().await;
        state
            .logs
            .get(topic)
            .map(|partitions| partitions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// All messages of `topic`, partition by partition.
    pub async fn messages(&self, topic: &str) -> Vec<Message> {
        let state = self.inner.state.read().await;
        state
            .logs
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Next offset `group_id` will read from on `topic[partition]`.
    pub async fn committed_offset(&self, group_id: &str, topic: &str, partition: i32) -> i64 {
        let state = self.inner.state.read().await;
        state
            .committed
            .get(&(group_id.to_string(), topic.to_string(), partition))
            .copied()
            .unwrap_or(0)
    }

    /// Shuts the broker down. Pending and future calls fail with
    /// [`BrokerError::Closed`].
    pub async fn shutdown(&self) {
        self.inner.state.write().await.closed = true;
        self.inner.appended.notify_waiters();
    }

    async fn append(&self, record: Record) -> Result<RecordMetadata, BrokerError> {
        let partition = self.partition_for(record.key);
        let partitions = self.inner.partitions as usize;

        let mut state = self.inner.state.write().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }

        let log = state
            .logs
            .entry(record.topic.clone())
            .or_insert_with(|| vec![Vec::new(); partitions]);
        let messages = &mut log[partition as usize];
        let offset = messages.len() as i64;
        messages.push(Message {
            topic: record.topic,
            partition,
            offset,
            key: record.key,
            value: record.value,
            timestamp: Utc::now(),
        });
        drop(state);

        self.inner.appended.notify_waiters();
        Ok(RecordMetadata { partition, offset })
    }

    async fn pending(
        &self,
        group_id: &str,
        topics: &[String],
    ) -> Result<Vec<PartitionClaim>, BrokerError> {
        let state = self.inner.state.read().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }

        let mut claims = Vec::new();
        for topic in topics {
            let Some(partitions) = state.logs.get(topic) else {
                continue;
            };
            for (partition, messages) in partitions.iter().enumerate() {
                let partition = partition as i32;
                let committed = state
                    .committed
                    .get(&(group_id.to_string(), topic.clone(), partition))
                    .copied()
                    .unwrap_or(0) as usize;
                if committed < messages.len() {
                    claims.push(PartitionClaim {
                        topic: topic.clone(),
                        partition,
                        messages: messages[committed..].to_vec(),
                    });
                }
            }
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("partitions", &self.inner.partitions)
            .finish_non_exhaustive()
    }
}

/// Producer handle on an [`InMemoryBroker`].
#[derive(Clone, Debug)]
pub struct InMemoryProducer {
    broker: InMemoryBroker,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Producer for InMemoryProducer {
    async fn send(&self, record: Record) -> Result<RecordMetadata, BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        self.broker.append(record).await
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Consumer-group member on an [`InMemoryBroker`].
pub struct InMemoryConsumer {
    broker: InMemoryBroker,
    group_id: String,
    member_id: Uuid,
    errors_tx: mpsc::Sender<BrokerError>,
    errors_rx: Mutex<Option<mpsc::Receiver<BrokerError>>>,
    closed: AtomicBool,
}

impl InMemoryConsumer {
    pub fn member_id(&self) -> Uuid {
        self.member_id
    }

    /// Publishes a broker-level error to this member's error channel.
    ///
    /// Drops the error when the channel is full.
    pub fn report_error(&self, error: BrokerError) {
        if let Err(e) = self.errors_tx.try_send(error) {
            tracing::warn!(group_id = %self.group_id, error = %e, "broker error dropped");
        }
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GroupConsumer for InMemoryConsumer {
    fn group_id(&self) -> &str {
        &self.group_id
    }

    async fn claim(&self, topics: &[String]) -> Result<Vec<PartitionClaim>, BrokerError> {
        loop {
            self.ensure_open()?;

            // Register interest before checking, so an append between the
            // check and the await still wakes us.
            let appended = self.broker.inner.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            let claims = self.broker.pending(&self.group_id, topics).await?;
            if !claims.is_empty() {
                tracing::trace!(
                    group_id = %self.group_id,
                    member_id = %self.member_id,
                    partitions = claims.len(),
                    "partitions claimed"
                );
                return Ok(claims);
            }

            appended.await;
        }
    }

    async fn commit(&self, message: &Message) -> Result<(), BrokerError> {
        self.ensure_open()?;

        let mut state = self.broker.inner.state.write().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }
        let next = message.offset + 1;
        let committed = state
            .committed
            .entry((
                self.group_id.clone(),
                message.topic.clone(),
                message.partition,
            ))
            .or_insert(0);
        *committed = (*committed).max(next);
        Ok(())
    }

    fn take_errors(&self) -> Option<mpsc::Receiver<BrokerError>> {
        self.errors_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(group_id = %self.group_id, member_id = %self.member_id, "left consumer group");
            self.broker.inner.appended.notify_waiters();
        }
        Ok(())
    }
}
