//! Offline maintenance tool for the note queue.

use clap::Parser;
use tracing::error;

use vnote_queue::{HandlerRegistry, TaskQueue};
use vnote_worker::{telemetry, AdminCli, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = AdminCli::parse();
    telemetry::init_tracing();

    let config = WorkerConfig::from_env();

    // No handlers and no workers: the daemon executes what we reset.
    let queue = match TaskQueue::open(config.queue, HandlerRegistry::new()).await {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to open task queue: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command.run(&queue).await {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                error!("Failed to render report: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!("Command failed: {}", e);
            std::process::exit(1);
        }
    }
}
