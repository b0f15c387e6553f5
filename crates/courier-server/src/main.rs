#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use courier::{
    Handler, MemoryBroker, ProduceCycle, Scheduler, ShutdownCoordinator, WorkerPool, Writer,
};
use server::config::{CliArgs, ServerConfig};
use server::handler::LoggingHandler;
use server::source::SnapshotSource;
use server::telemetry::init_telemetry;
use std::sync::Arc;
use tokio::{signal, task::JoinHandle};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry(config.log_format)?;
    log_startup_info(&config);

    let result = run(config, shutdown_signal()).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Harness stopped with an error");
    }

    providers.shutdown();
    result
}

async fn run(config: ServerConfig, stop: impl Future<Output = ()>) -> anyhow::Result<()> {
    let broker = MemoryBroker::connect(config.brokers.as_slice(), config.partitions)?
        .with_retention(config.retention)?;
    let shutdown = ShutdownCoordinator::new();
    serve(&config, &broker, &shutdown, Arc::new(LoggingHandler), stop).await
}

/// Runs the configured halves against `broker` until `stop` resolves or the
/// producer reaches its cycle limit, then drains every worker.
///
/// Everything that can fail is built before the first worker starts, so an
/// error return leaves nothing running.
async fn serve<H: Handler>(
    config: &ServerConfig,
    broker: &MemoryBroker,
    shutdown: &ShutdownCoordinator,
    handler: Arc<H>,
    stop: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let pool = WorkerPool::new(config.num_workers, shutdown.clone())?;
    let writer = Arc::new(broker.writer());

    let producer = if config.mode.produces() {
        let scheduler = Scheduler::new(config.poll_interval, shutdown.clone())?
            .with_max_cycles(config.max_cycles);
        let cycle = ProduceCycle::new(
            SnapshotSource::from_config(&config.source)?,
            pool.clone(),
            Arc::clone(&writer),
            config.topics.clone(),
            config.batch,
        );
        Some((scheduler, cycle))
    } else {
        None
    };

    // Readers are built for every worker before any of them starts.
    let consumers = if config.mode.consumes() {
        pool.spawn_consumers(
            |worker_id| {
                Ok(broker.reader(
                    config.topics.rates.as_str(),
                    config.group_id.as_str(),
                    worker_id,
                    config.read_timeout,
                ))
            },
            &handler,
            config.poll_interval,
        )?
    } else {
        Vec::new()
    };

    let mut producer: Option<JoinHandle<u64>> = producer
        .map(|(scheduler, cycle)| tokio::spawn(async move { scheduler.run(cycle).await }));

    // Run until stopped, or until the producer hits its cycle limit.
    let finished = match producer.as_mut() {
        Some(handle) => tokio::select! {
            () = stop => None,
            joined = handle => Some(joined),
        },
        None => {
            stop.await;
            None
        }
    };

    tracing::info!("Shutting down, draining workers...");
    shutdown.fire();

    let joined = match (finished, producer) {
        (Some(joined), _) => Some(joined),
        (None, Some(handle)) => Some(handle.await),
        (None, None) => None,
    };
    match joined {
        Some(Ok(cycles)) => tracing::info!(cycles, "Producer stopped"),
        Some(Err(e)) => tracing::error!(error = %e, "Producer task aborted"),
        None => {}
    }

    shutdown.wait().await;
    for handle in consumers {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Consumer worker aborted");
        }
    }

    if let Err(e) = writer.close().await {
        tracing::warn!(error = %e, "Failed to close writer");
    }
    tracing::info!(
        retained = broker.len(&config.topics.rates),
        "Harness shut down successfully"
    );
    Ok(())
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting courier with full config: {:#?}", config);
    } else {
        tracing::info!(
            mode = ?config.mode,
            workers = config.num_workers,
            brokers = ?config.brokers,
            "Starting courier"
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
