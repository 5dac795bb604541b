use hostmon_core::metrics::{
    run_writer, Sampler, ScheduleConfig, Scheduler, SnapshotQueue, SysinfoProbe,
};
use hostmon_core::{
    init_observability, open_sink, shutdown_observability, Config, HealthChecker,
    ObservabilityOptions,
};
use hostmon_daemon::{api, shutdown, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    // Initialize observability FIRST
    init_observability(&ObservabilityOptions {
        log_level: config.log_level.clone(),
        prometheus_port: config.prometheus_enabled.then_some(config.prometheus_port),
    })?;

    info!(version = env!("CARGO_PKG_VERSION"), "hostmon daemon starting");

    let health = HealthChecker::new();
    health.register_subsystem("sampler").await;
    health.register_subsystem("storage").await;

    let sink = match open_sink(&config).await {
        Ok(sink) => sink,
        Err(e) => {
            error!("Failed to open storage backend: {}", e);
            return Err(e.into());
        }
    };

    let probe = Arc::new(SysinfoProbe::new(config.cpu_sample_window));
    let sampler = Arc::new(
        Sampler::new(probe, config.mount_point.clone()).with_max_baseline_age(config.retention),
    );
    let queue = Arc::new(SnapshotQueue::new(config.queue_capacity, config.backpressure));
    info!(
        capacity = queue.capacity(),
        policy = queue.policy().as_str(),
        "Persistence queue ready"
    );

    let writer = tokio::spawn(run_writer(queue.clone(), sink.clone(), Some(health.clone())));

    let shutdown_tx = shutdown::shutdown_signal();

    let scheduler = Scheduler::new(
        sampler.clone(),
        queue.clone(),
        sink.clone(),
        ScheduleConfig {
            collect_interval: config.collect_interval,
            cleanup_interval: config.cleanup_interval,
            retention: config.retention,
        },
    )
    .with_health(health.clone());
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

    let state = AppState { sampler, queue: queue.clone(), sink, health };
    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    info!("hostmon daemon ready");

    if let Err(e) = api::serve(addr, state, shutdown_tx.subscribe()).await {
        error!("HTTP API failed: {}", e);
        let _ = shutdown_tx.send(());
    }

    if let Err(e) = scheduler_handle.await {
        error!("Scheduler task failed: {}", e);
    }
    shutdown::drain_writer(&queue, writer, shutdown::DRAIN_TIMEOUT).await;

    info!("hostmon daemon shutting down");
    shutdown_observability();
    Ok(())
}
