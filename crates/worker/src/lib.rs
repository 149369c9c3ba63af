//! Runs the delivery and kitchen services against one broker.
//!
//! Each service gets its own consumer group. A drain task per group logs
//! the errors the group reports while it keeps consuming.

pub mod config;
pub mod error;

use std::sync::Arc;

use domain::{Delivery, DeliveryService, InMemoryRepository, KitchenService, Ticket};
use event_bus::{
    ConsumerError, ConsumerGroup, InMemoryBroker, InMemoryConsumer, InMemoryProducer, Publisher,
    Registry,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use config::{Config, LogFormat};
pub use error::{Result, WorkerError};

pub type Deliveries = DeliveryService<InMemoryRepository<Delivery>, InMemoryProducer>;
pub type Kitchen = KitchenService<InMemoryRepository<Ticket>, InMemoryProducer>;

/// Installs the global tracing subscriber.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

struct RunningGroup {
    group_id: String,
    run: JoinHandle<std::result::Result<(), ConsumerError>>,
    drain: Option<JoinHandle<u64>>,
}

/// Both services with their running consumer groups.
pub struct Worker {
    deliveries: Arc<Deliveries>,
    kitchen: Arc<Kitchen>,
    cancel: CancellationToken,
    groups: Vec<RunningGroup>,
}

impl Worker {
    /// Builds both services on `broker` and starts consuming.
    #[tracing::instrument(skip_all, fields(partitions = broker.partitions()))]
    pub fn start(config: &Config, broker: &InMemoryBroker) -> Result<Self> {
        let deliveries = Arc::new(DeliveryService::new(
            InMemoryRepository::new(),
            Publisher::new(broker.producer()),
        ));
        let kitchen = Arc::new(KitchenService::new(
            InMemoryRepository::new(),
            Publisher::new(broker.producer()),
        ));

        let mut delivery_registry = Registry::builder();
        DeliveryService::register(&deliveries, &mut delivery_registry)?;
        let mut kitchen_registry = Registry::builder();
        KitchenService::register(&kitchen, &mut kitchen_registry)?;

        let mut worker = Self {
            deliveries,
            kitchen,
            cancel: CancellationToken::new(),
            groups: Vec::with_capacity(2),
        };
        for (group_id, registry) in [
            (Deliveries::GROUP_ID, delivery_registry.build()),
            (Kitchen::GROUP_ID, kitchen_registry.build()),
        ] {
            worker.spawn(ConsumerGroup::new(
                config.consumer_config(group_id),
                broker.consumer(group_id),
                registry,
            ));
        }

        tracing::info!("worker started");
        Ok(worker)
    }

    fn spawn(&mut self, mut group: ConsumerGroup<InMemoryConsumer>) {
        let group_id = group.group_id().to_string();
        let drain = group
            .take_errors()
            .map(|errors| tokio::spawn(drain_errors(group_id.clone(), errors)));
        let cancel = self.cancel.clone();
        let run = tokio::spawn(async move { group.run(cancel).await });

        tracing::info!(%group_id, "consumer group started");
        self.groups.push(RunningGroup {
            group_id,
            run,
            drain,
        });
    }

    pub fn deliveries(&self) -> &Arc<Deliveries> {
        &self.deliveries
    }

    pub fn kitchen(&self) -> &Arc<Kitchen> {
        &self.kitchen
    }

    /// Token that stops every consumer group when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops the consumer groups, waits for them and closes both publishers.
    ///
    /// Returns how many consumer errors were reported while running. The
    /// first group that stopped with an error fails the shutdown, after
    /// everything has been closed.
    #[tracing::instrument(skip_all)]
    pub async fn shutdown(self) -> Result<u64> {
        self.cancel.cancel();

        let mut failure = None;
        let mut reported = 0;
        for group in self.groups {
            match group.run.await? {
                Ok(()) => tracing::info!(group_id = %group.group_id, "consumer group stopped"),
                Err(err) => {
                    tracing::error!(group_id = %group.group_id, error = %err, "consumer group failed");
                    failure.get_or_insert(WorkerError::Consumer(err));
                }
            }
            // The group's error sender is gone once it stops, so the drain ends.
            if let Some(drain) = group.drain {
                reported += drain.await?;
            }
        }

        self.deliveries.publisher().close().await?;
        self.kitchen.publisher().close().await?;
        tracing::info!(reported, "worker stopped");

        match failure {
            Some(err) => Err(err),
            None => Ok(reported),
        }
    }
}

async fn drain_errors(group_id: String, mut errors: mpsc::Receiver<ConsumerError>) -> u64 {
    let mut reported = 0;
    while let Some(error) = errors.recv().await {
        reported += 1;
        metrics::counter!("worker_consumer_errors", "group" => group_id.clone()).increment(1);
        tracing::error!(%group_id, %error, "consumer error");
    }
    reported
}
