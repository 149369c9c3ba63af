//! Consumer-group runtime.
//!
//! A [`ConsumerGroup`] subscribes to every topic of its [`Registry`], claims
//! partitions from the broker, and feeds each message through
//! [`Registry::dispatch`]. Offsets are committed only after a message was
//! handled (or had no handler). A failed message aborts its partition's
//! session, so it and everything after it is redelivered on the next claim.

use std::time::Instant;

use futures_util::future::join_all;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::broker::{GroupConsumer, Message, PartitionClaim};
use crate::config::{ConsumerConfig, MIN_REBALANCE_DELAY};
use crate::envelope::RawEnvelope;
use crate::error::{BrokerError, ConsumerError};
use crate::registry::{Dispatched, Registry};

/// Lifecycle of a [`ConsumerGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Constructed, not yet running.
    Idle,
    /// Inside [`ConsumerGroup::run`].
    Running,
    /// Cancelled or closed. The broker client has been released.
    Stopped,
}

impl RuntimeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Step {
    BrokerError(BrokerError),
    Claimed(Result<Vec<PartitionClaim>, BrokerError>),
}

/// Runs one member of a consumer group.
///
/// Errors that do not stop the runtime (failed sessions, broker
/// notifications) are published on a bounded channel obtained from
/// [`take_errors`](Self::take_errors). When that channel is full the newest
/// error is logged and dropped; the runtime never waits on a reader.
pub struct ConsumerGroup<C: GroupConsumer> {
    config: ConsumerConfig,
    client: C,
    registry: Registry,
    state: RuntimeState,
    errors_tx: mpsc::Sender<ConsumerError>,
    errors_rx: Option<mpsc::Receiver<ConsumerError>>,
}

impl<C: GroupConsumer> ConsumerGroup<C> {
    pub fn new(config: ConsumerConfig, client: C, registry: Registry) -> Self {
        let (errors_tx, errors_rx) = mpsc::channel(config.error_buffer.max(1));
        Self {
            config,
            client,
            registry,
            state: RuntimeState::Idle,
            errors_tx,
            errors_rx: Some(errors_rx),
        }
    }

    pub fn group_id(&self) -> &str {
        &self.config.group_id
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Takes the receiving end of the error channel. Returns `None` once taken.
    pub fn take_errors(&mut self) -> Option<mpsc::Receiver<ConsumerError>> {
        self.errors_rx.take()
    }

    /// Consumes until `cancel` fires, then releases the broker client.
    ///
    /// A message that is being handled when `cancel` fires is finished
    /// first; cancellation is checked between messages. Returns an error
    /// only if the runtime was not idle or the broker client was closed
    /// underneath it.
    #[tracing::instrument(skip_all, fields(group_id = %self.config.group_id))]
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), ConsumerError> {
        if self.state != RuntimeState::Idle {
            return Err(ConsumerError::NotIdle(self.state));
        }
        self.state = RuntimeState::Running;

        let topics = self.registry.topics().to_vec();
        if topics.is_empty() {
            tracing::warn!("no handlers registered, runtime will idle until cancelled");
        }
        tracing::info!(?topics, handlers = self.registry.len(), "consumer group started");

        let mut broker_errors = self.client.take_errors();
        let mut outcome = Ok(());

        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                error = next_broker_error(&mut broker_errors) => Step::BrokerError(error),
                claimed = self.client.claim(&topics) => Step::Claimed(claimed),
            };

            match step {
                Step::BrokerError(error) => {
                    tracing::warn!(error = %error, "broker error");
                    self.notify(ConsumerError::Broker(error));
                }
                Step::Claimed(Ok(claims)) => {
                    if !self.process_session(claims, &cancel).await {
                        self.wait_rebalance(&cancel).await;
                    }
                }
                Step::Claimed(Err(BrokerError::Closed)) => {
                    tracing::info!("broker client closed, stopping");
                    outcome = Err(ConsumerError::Broker(BrokerError::Closed));
                    break;
                }
                Step::Claimed(Err(error)) => {
                    tracing::warn!(error = %error, "claim failed");
                    self.notify(ConsumerError::Broker(error));
                    self.wait_rebalance(&cancel).await;
                }
            }
        }

        self.close().await?;
        tracing::info!("consumer group stopped");
        outcome
    }

    /// Leaves the group and releases the broker client. Idempotent.
    pub async fn close(&mut self) -> Result<(), ConsumerError> {
        if self.state == RuntimeState::Stopped {
            return Ok(());
        }
        self.state = RuntimeState::Stopped;
        self.client.close().await?;
        Ok(())
    }

    /// Processes one session's claims concurrently. Returns `false` if any
    /// partition aborted.
    async fn process_session(&self, claims: Vec<PartitionClaim>, cancel: &CancellationToken) -> bool {
        let results = join_all(
            claims
                .iter()
                .map(|claim| self.consume_claim(claim, cancel)),
        )
        .await;

        let mut healthy = true;
        for error in results.into_iter().filter_map(Result::err) {
            healthy = false;
            tracing::warn!(
                error = %error,
                "session aborted, uncommitted messages will be redelivered"
            );
            self.notify(error);
        }

        if !healthy {
            metrics::counter!("consumer_sessions_failed", "group_id" => self.config.group_id.clone())
                .increment(1);
        }
        healthy
    }

    async fn consume_claim(
        &self,
        claim: &PartitionClaim,
        cancel: &CancellationToken,
    ) -> Result<(), ConsumerError> {
        for message in &claim.messages {
            if cancel.is_cancelled() {
                tracing::debug!(
                    topic = %claim.topic,
                    partition = claim.partition,
                    "cancelled, leaving claim"
                );
                break;
            }
            self.consume_message(message).await?;
        }
        Ok(())
    }

    async fn consume_message(&self, message: &Message) -> Result<(), ConsumerError> {
        let envelope =
            RawEnvelope::from_slice(&message.value).map_err(|source| ConsumerError::Envelope {
                topic: message.topic.clone(),
                partition: message.partition,
                offset: message.offset,
                source,
            })?;

        let started = Instant::now();
        let outcome = self
            .registry
            .dispatch(&message.topic, envelope)
            .await
            .map_err(|source| ConsumerError::Dispatch {
                topic: message.topic.clone(),
                partition: message.partition,
                offset: message.offset,
                source,
            })?;
        metrics::histogram!("consumer_dispatch_duration_seconds", "topic" => message.topic.clone())
            .record(started.elapsed().as_secs_f64());

        self.client
            .commit(message)
            .await
            .map_err(|source| ConsumerError::Commit {
                topic: message.topic.clone(),
                partition: message.partition,
                offset: message.offset,
                source,
            })?;

        match outcome {
            Dispatched::Handled => {
                metrics::counter!("consumer_messages_processed", "topic" => message.topic.clone())
                    .increment(1);
            }
            Dispatched::Unrouted => {
                metrics::counter!("consumer_messages_unrouted", "topic" => message.topic.clone())
                    .increment(1);
            }
        }
        tracing::trace!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "message committed"
        );
        Ok(())
    }

    async fn wait_rebalance(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(self.config.rebalance_delay.max(MIN_REBALANCE_DELAY)) => {}
        }
    }

    fn notify(&self, error: ConsumerError) {
        match self.errors_tx.try_send(error) {
            Ok(()) => {}
            Err(TrySendError::Full(error)) => {
                metrics::counter!("consumer_errors_dropped", "group_id" => self.config.group_id.clone())
                    .increment(1);
                tracing::warn!(error = %error, "error channel full, dropping notification");
            }
            Err(TrySendError::Closed(error)) => {
                tracing::debug!(error = %error, "error channel closed");
            }
        }
    }
}

impl<C: GroupConsumer> std::fmt::Debug for ConsumerGroup<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerGroup")
            .field("group_id", &self.config.group_id)
            .field("state", &self.state)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Resolves with the next broker error. Pends forever once the channel is
/// gone.
async fn next_broker_error(errors: &mut Option<mpsc::Receiver<BrokerError>>) -> BrokerError {
    loop {
        let Some(receiver) = errors.as_mut() else {
            return std::future::pending().await;
        };
        if let Some(error) = receiver.recv().await {
            return error;
        }
        *errors = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Producer, Record};
    use crate::envelope::Envelope;
    use crate::error::{DispatchError, PayloadError};
    use crate::memory::{InMemoryBroker, InMemoryConsumer};
    use crate::publisher::Publisher;
    use crate::registry::{EventHandler, HandlerError};
    use crate::topic::tests::{CourierCreated, CourierEvent};
    use crate::topic::{EventKind, TopicEvent};
    use async_trait::async_trait;
    use common::AggregateId;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use tokio::task::JoinHandle;

    const GROUP: &str = "delivery-svc";

    #[derive(Default)]
    struct RecordingHandler {
        received: Mutex<Vec<CourierCreated>>,
    }

    #[async_trait]
    impl EventHandler<CourierCreated> for RecordingHandler {
        async fn handle(&self, event: Envelope<CourierCreated>) -> Result<(), HandlerError> {
            self.received.lock().await.push(event.into_payload());
            Ok(())
        }
    }

    fn registry(handler: Arc<RecordingHandler>) -> Registry {
        let mut builder = Registry::builder();
        builder
            .register::<CourierEvent, CourierCreated, _>(CourierEvent::COURIER_CREATED, handler)
            .unwrap();
        builder.build()
    }

    fn config() -> ConsumerConfig {
        ConsumerConfig::new(GROUP).with_rebalance_delay(Duration::from_millis(10))
    }

    type RunHandle = JoinHandle<(ConsumerGroup<InMemoryConsumer>, Result<(), ConsumerError>)>;

    fn spawn(mut group: ConsumerGroup<InMemoryConsumer>, cancel: CancellationToken) -> RunHandle {
        tokio::spawn(async move {
            let result = group.run(cancel).await;
            (group, result)
        })
    }

    async fn wait_for_commit(broker: &InMemoryBroker, partition: i32, offset: i64) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while broker
                .committed_offset(GROUP, CourierEvent::TOPIC, partition)
                .await
                < offset
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("offset was not committed in time");
    }

    async fn publish_raw(broker: &InMemoryBroker, kind: i32, payload: serde_json::Value) {
        Publisher::new(broker.producer())
            .publish(
                CourierEvent::TOPIC,
                EventKind::new(kind),
                AggregateId::new(1),
                &payload,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn handles_and_commits_registered_messages() {
        let broker = InMemoryBroker::new(1);
        let handler = Arc::new(RecordingHandler::default());
        let group = ConsumerGroup::new(config(), broker.consumer(GROUP), registry(handler.clone()));

        publish_raw(&broker, 1, serde_json::json!({"ID": 1, "Name": "Volen"})).await;
        publish_raw(&broker, 1, serde_json::json!({"ID": 2, "Name": "Ana"})).await;

        let cancel = CancellationToken::new();
        let run = spawn(group, cancel.clone());
        wait_for_commit(&broker, 0, 2).await;
        cancel.cancel();

        let (group, result) = run.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(group.state(), RuntimeState::Stopped);

        let names: Vec<_> = handler
            .received
            .lock()
            .await
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(names, vec!["Volen", "Ana"]);
    }

    #[tokio::test]
    async fn unrouted_messages_are_committed() {
        let broker = InMemoryBroker::new(1);
        let handler = Arc::new(RecordingHandler::default());
        let group = ConsumerGroup::new(config(), broker.consumer(GROUP), registry(handler.clone()));

        publish_raw(&broker, 42, serde_json::json!({"Anything": true})).await;

        let cancel = CancellationToken::new();
        let run = spawn(group, cancel.clone());
        wait_for_commit(&broker, 0, 1).await;
        cancel.cancel();
        run.await.unwrap().1.unwrap();

        assert!(handler.received.lock().await.is_empty());
    }

    #[tokio::test]
    async fn decode_failure_aborts_session_without_commit() {
        let broker = InMemoryBroker::new(1);
        let handler = Arc::new(RecordingHandler::default());
        let mut group =
            ConsumerGroup::new(config(), broker.consumer(GROUP), registry(handler.clone()));
        let mut errors = group.take_errors().unwrap();

        publish_raw(&broker, 1, serde_json::json!({"ID": "not-a-number"})).await;
        publish_raw(&broker, 1, serde_json::json!({"ID": 2, "Name": "Ana"})).await;

        let cancel = CancellationToken::new();
        let run = spawn(group, cancel.clone());

        let error = tokio::time::timeout(Duration::from_secs(2), errors.recv())
            .await
            .unwrap()
            .unwrap();
        match error {
            ConsumerError::Dispatch { offset, source, .. } => {
                assert_eq!(offset, 0);
                assert!(matches!(
                    source,
                    DispatchError::Decode(PayloadError::Malformed { .. })
                ));
            }
            other => panic!("expected dispatch error, got {other:?}"),
        }

        // The poison message is redelivered, so the session keeps failing.
        let again = tokio::time::timeout(Duration::from_secs(2), errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(again, ConsumerError::Dispatch { offset: 0, .. }));

        cancel.cancel();
        run.await.unwrap().1.unwrap();

        assert_eq!(broker.committed_offset(GROUP, CourierEvent::TOPIC, 0).await, 0);
        assert!(handler.received.lock().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_envelope_is_reported() {
        let broker = InMemoryBroker::new(1);
        let mut group = ConsumerGroup::new(
            config(),
            broker.consumer(GROUP),
            registry(Arc::new(RecordingHandler::default())),
        );
        let mut errors = group.take_errors().unwrap();

        broker
            .producer()
            .send(Record {
                topic: CourierEvent::TOPIC.to_string(),
                key: AggregateId::new(1),
                value: b"not json".to_vec(),
            })
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let run = spawn(group, cancel.clone());
        let error = tokio::time::timeout(Duration::from_secs(2), errors.recv())
            .await
            .unwrap()
            .unwrap();
        cancel.cancel();
        run.await.unwrap();

        assert!(matches!(error, ConsumerError::Envelope { offset: 0, .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_waiting_runtime() {
        let broker = InMemoryBroker::new(1);
        let group = ConsumerGroup::new(
            config(),
            broker.consumer(GROUP),
            registry(Arc::new(RecordingHandler::default())),
        );

        let cancel = CancellationToken::new();
        let run = spawn(group, cancel.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!run.is_finished());

        cancel.cancel();
        let (group, result) = tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(group.state(), RuntimeState::Stopped);
    }

    #[tokio::test]
    async fn run_requires_idle_runtime() {
        let broker = InMemoryBroker::new(1);
        let mut group = ConsumerGroup::new(
            config(),
            broker.consumer(GROUP),
            registry(Arc::new(RecordingHandler::default())),
        );
        group.close().await.unwrap();
        group.close().await.unwrap();

        let result = group.run(CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(ConsumerError::NotIdle(RuntimeState::Stopped))
        ));
    }

    #[tokio::test]
    async fn broker_shutdown_stops_runtime_with_error() {
        let broker = InMemoryBroker::new(1);
        let group = ConsumerGroup::new(
            config(),
            broker.consumer(GROUP),
            registry(Arc::new(RecordingHandler::default())),
        );

        let run = spawn(group, CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.shutdown().await;

        let (group, result) = tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            result,
            Err(ConsumerError::Broker(BrokerError::Closed))
        ));
        assert_eq!(group.state(), RuntimeState::Stopped);
    }

    #[tokio::test]
    async fn broker_errors_are_forwarded() {
        let broker = InMemoryBroker::new(1);
        let client = broker.consumer(GROUP);
        client.report_error(BrokerError::Rebalance {
            group_id: GROUP.to_string(),
            reason: "member left".into(),
        });
        let mut group = ConsumerGroup::new(
            config(),
            client,
            registry(Arc::new(RecordingHandler::default())),
        );
        let mut errors = group.take_errors().unwrap();
        assert!(group.take_errors().is_none());

        let cancel = CancellationToken::new();
        let run = spawn(group, cancel.clone());
        let error = tokio::time::timeout(Duration::from_secs(1), errors.recv())
            .await
            .unwrap()
            .unwrap();
        cancel.cancel();
        run.await.unwrap().1.unwrap();

        assert!(matches!(
            error,
            ConsumerError::Broker(BrokerError::Rebalance { ref reason, .. }) if reason == "member left"
        ));
    }

    #[tokio::test]
    async fn full_error_channel_drops_newest() {
        let broker = InMemoryBroker::new(1);
        let client = broker.consumer(GROUP);
        client.report_error(BrokerError::Connection("first".into()));
        client.report_error(BrokerError::Connection("second".into()));
        let mut group = ConsumerGroup::new(
            config().with_error_buffer(1),
            client,
            registry(Arc::new(RecordingHandler::default())),
        );
        let mut errors = group.take_errors().unwrap();

        let cancel = CancellationToken::new();
        let run = spawn(group, cancel.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        run.await.unwrap().1.unwrap();

        assert!(matches!(
            errors.try_recv(),
            Ok(ConsumerError::Broker(BrokerError::Connection(ref reason))) if reason == "first"
        ));
        assert!(errors.try_recv().is_err());
    }

    #[test]
    fn runtime_state_display() {
        assert_eq!(RuntimeState::Idle.to_string(), "Idle");
        assert_eq!(RuntimeState::Running.as_str(), "Running");
        assert_eq!(
            ConsumerError::NotIdle(RuntimeState::Stopped).to_string(),
            "Consumer runtime is Stopped, expected Idle"
        );
    }
}
