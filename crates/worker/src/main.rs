//! Worker entry point.

use event_bus::InMemoryBroker;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use worker::{Config, Worker, WorkerError};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    // 1. Configuration and tracing
    let config = Config::from_env();
    worker::init_tracing(&config);

    // 2. Prometheus exporter with its own listener
    PrometheusBuilder::new()
        .with_http_listener(config.metrics_addr())
        .install()?;
    tracing::info!(addr = %config.metrics_addr(), "metrics exporter listening");

    // 3. Broker and services
    let broker = InMemoryBroker::from_config(&config.producer_config());
    let worker = Worker::start(&config, &broker)?;
    tracing::info!(brokers = ?config.brokers, partitions = config.partitions, "consuming");

    // 4. Run until signalled, then drain
    shutdown_signal().await;
    let reported = worker.shutdown().await?;
    broker.shutdown().await;

    tracing::info!(reported, "worker shut down gracefully");
    Ok(())
}
