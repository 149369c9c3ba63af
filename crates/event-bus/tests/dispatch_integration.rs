//! Integration tests: Publisher → InMemoryBroker → ConsumerGroup → handlers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::AggregateId;
use event_bus::{
    ConsumerConfig, ConsumerError, ConsumerGroup, Envelope, EventHandler, EventKind, HandlerError,
    InMemoryBroker, Publisher, Registry, TopicEvent, topic_events,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CourierCreated {
    #[serde(rename = "ID")]
    id: i64,
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OrderPlaced {
    #[serde(rename = "ID")]
    id: i64,
    #[serde(rename = "Total")]
    total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OrderLineAdded {
    #[serde(rename = "OrderID")]
    order_id: i64,
    #[serde(rename = "Line")]
    line: u32,
}

topic_events! {
    enum CourierEvent: "courier-events-topic" {
        CourierCreated(CourierCreated) = 1 => COURIER_CREATED,
    }
}

topic_events! {
    enum OrderEvent: "order-events-topic" {
        OrderPlaced(OrderPlaced) = 1 => ORDER_PLACED,
        OrderLineAdded(OrderLineAdded) = 2 => ORDER_LINE_ADDED,
    }
}

/// Records every payload it receives, with the envelope's aggregate id.
struct Recorder<P> {
    seen: Mutex<Vec<(AggregateId, P)>>,
}

impl<P> Recorder<P> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl<P: Send + Sync + 'static> EventHandler<P> for Recorder<P> {
    async fn handle(&self, event: Envelope<P>) -> Result<(), HandlerError> {
        let aggregate_id = event.aggregate_id();
        self.seen.lock().await.push((aggregate_id, event.into_payload()));
        Ok(())
    }
}

async fn wait_until<F, Fut>(mut done: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_each_registered_pair_reaches_exactly_its_handler() {
    let broker = InMemoryBroker::new(3);
    let couriers = Recorder::<CourierCreated>::new();
    let orders = Recorder::<OrderPlaced>::new();
    let lines = Recorder::<OrderLineAdded>::new();

    let mut builder = Registry::builder();
    builder
        .register::<CourierEvent, CourierCreated, _>(CourierEvent::COURIER_CREATED, couriers.clone())
        .unwrap()
        .register::<OrderEvent, OrderPlaced, _>(OrderEvent::ORDER_PLACED, orders.clone())
        .unwrap()
        .register::<OrderEvent, OrderLineAdded, _>(OrderEvent::ORDER_LINE_ADDED, lines.clone())
        .unwrap();
    let registry = builder.build();
    assert_eq!(
        registry.topics(),
        &["courier-events-topic".to_string(), "order-events-topic".to_string()]
    );

    let publisher = Publisher::new(broker.producer());
    publisher
        .publish_event(
            AggregateId::new(1),
            &CourierEvent::from(CourierCreated {
                id: 1,
                name: "Volen".into(),
            }),
        )
        .await
        .unwrap();
    for order_id in 10..16 {
        publisher
            .publish_event(
                AggregateId::new(order_id),
                &OrderEvent::from(OrderPlaced {
                    id: order_id,
                    total: order_id * 100,
                }),
            )
            .await
            .unwrap();
        for line in 1..=3 {
            publisher
                .publish_event(
                    AggregateId::new(order_id),
                    &OrderEvent::from(OrderLineAdded { order_id, line }),
                )
                .await
                .unwrap();
        }
    }

    let group = ConsumerGroup::new(
        ConsumerConfig::new("integration-svc"),
        broker.consumer("integration-svc"),
        registry,
    );
    let cancel = CancellationToken::new();
    let run = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut group = group;
            group.run(cancel).await
        })
    };

    wait_until(|| {
        let lines = lines.clone();
        let couriers = couriers.clone();
        async move {
            lines.seen.lock().await.len() == 18 && couriers.seen.lock().await.len() == 1
        }
    })
    .await;
    cancel.cancel();
    run.await.unwrap().unwrap();

    // Kind 1 exists on both topics; each went only to its own handler.
    let couriers = couriers.seen.lock().await;
    assert_eq!(couriers.len(), 1);
    assert_eq!(couriers[0].1.name, "Volen");
    assert_eq!(orders.seen.lock().await.len(), 6);

    // Per-aggregate order survives partitioning.
    let lines = lines.seen.lock().await;
    for order_id in 10..16 {
        let for_order: Vec<u32> = lines
            .iter()
            .filter(|(id, _)| *id == AggregateId::new(order_id))
            .map(|(_, added)| added.line)
            .collect();
        assert_eq!(for_order, vec![1, 2, 3]);
    }
}

#[tokio::test]
async fn test_unregistered_kinds_are_skipped_and_committed() {
    let broker = InMemoryBroker::new(1);
    let orders = Recorder::<OrderPlaced>::new();

    let mut builder = Registry::builder();
    builder
        .register::<OrderEvent, OrderPlaced, _>(OrderEvent::ORDER_PLACED, orders.clone())
        .unwrap();

    let publisher = Publisher::new(broker.producer());
    publisher
        .publish_event(
            AggregateId::new(7),
            &OrderEvent::from(OrderLineAdded {
                order_id: 7,
                line: 1,
            }),
        )
        .await
        .unwrap();
    publisher
        .publish(
            OrderEvent::TOPIC,
            EventKind::new(99),
            AggregateId::new(7),
            &serde_json::json!({"Unknown": true}),
        )
        .await
        .unwrap();
    publisher
        .publish_event(
            AggregateId::new(7),
            &OrderEvent::from(OrderPlaced { id: 7, total: 700 }),
        )
        .await
        .unwrap();

    let mut group = ConsumerGroup::new(
        ConsumerConfig::new("orders-svc"),
        broker.consumer("orders-svc"),
        builder.build(),
    );
    let mut errors = group.take_errors().unwrap();
    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { group.run(cancel).await }
    });

    wait_until(|| {
        let broker = broker.clone();
        async move { broker.committed_offset("orders-svc", OrderEvent::TOPIC, 0).await == 3 }
    })
    .await;
    cancel.cancel();
    run.await.unwrap().unwrap();

    assert_eq!(
        *orders.seen.lock().await,
        vec![(AggregateId::new(7), OrderPlaced { id: 7, total: 700 })]
    );
    assert!(errors.try_recv().is_err());
}

#[tokio::test]
async fn test_handler_failure_blocks_partition_until_fixed() {
    struct Flaky {
        fail: std::sync::atomic::AtomicBool,
        handled: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl EventHandler<OrderPlaced> for Flaky {
        async fn handle(&self, event: Envelope<OrderPlaced>) -> Result<(), HandlerError> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err("order store unavailable".into());
            }
            self.handled.lock().await.push(event.payload().id);
            Ok(())
        }
    }

    let broker = InMemoryBroker::new(1);
    let handler = Arc::new(Flaky {
        fail: std::sync::atomic::AtomicBool::new(true),
        handled: Mutex::new(Vec::new()),
    });
    let mut builder = Registry::builder();
    builder
        .register::<OrderEvent, OrderPlaced, _>(OrderEvent::ORDER_PLACED, handler.clone())
        .unwrap();

    let publisher = Publisher::new(broker.producer());
    for id in [1, 2] {
        publisher
            .publish_event(
                AggregateId::new(id),
                &OrderEvent::from(OrderPlaced { id, total: 1 }),
            )
            .await
            .unwrap();
    }

    let mut group = ConsumerGroup::new(
        ConsumerConfig::new("orders-svc").with_rebalance_delay(Duration::from_millis(10)),
        broker.consumer("orders-svc"),
        builder.build(),
    );
    let mut errors = group.take_errors().unwrap();
    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { group.run(cancel).await }
    });

    let error = tokio::time::timeout(Duration::from_secs(2), errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(error, ConsumerError::Dispatch { offset: 0, .. }));
    assert_eq!(broker.committed_offset("orders-svc", OrderEvent::TOPIC, 0).await, 0);

    // Once the handler recovers, the redelivered messages go through in order.
    handler.fail.store(false, std::sync::atomic::Ordering::SeqCst);
    wait_until(|| {
        let handler = handler.clone();
        async move { handler.handled.lock().await.len() == 2 }
    })
    .await;
    cancel.cancel();
    run.await.unwrap().unwrap();

    assert_eq!(*handler.handled.lock().await, vec![1, 2]);
}
