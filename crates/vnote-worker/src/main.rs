//! Video note worker binary.

use tracing::{error, info, warn};

use vnote_queue::TaskQueue;
use vnote_worker::{build_handlers, telemetry, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    telemetry::init_tracing();

    info!("Starting vnote-worker");

    // Load configuration
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    if let Ok(Some(addr)) = config.metrics_socket_addr() {
        match telemetry::install_metrics_exporter(addr) {
            Ok(()) => info!("Prometheus metrics listening on {}", addr),
            Err(e) => warn!("Metrics exporter disabled: {}", e),
        }
    }

    let handlers = match build_handlers(&config) {
        Ok(h) => h,
        Err(e) => {
            error!("Failed to build job handlers: {}", e);
            std::process::exit(1);
        }
    };

    // Open the queue; this replays persisted tasks
    let queue = match TaskQueue::open(config.queue.clone(), handlers).await {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to open task queue: {}", e);
            std::process::exit(1);
        }
    };

    let report = queue.recovery_report();
    info!(
        loaded = report.loaded,
        reset_running = report.reset_running,
        enqueued = report.enqueued,
        corrupt = report.corrupt,
        "Recovery complete"
    );

    if let Err(e) = queue.start().await {
        error!("Failed to start workers: {}", e);
        std::process::exit(1);
    }

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");

    if !queue.shutdown().await {
        warn!("Shutdown timed out with jobs still running");
    }

    info!("Worker shutdown complete");
}
