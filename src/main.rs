//! set-storm: a concurrent SET load generator
//!
//! Opens many simultaneous TCP connections to a line-based key-value server,
//! sends one `SET <key> <value>` command per connection, prints whatever
//! comes back and reports the total wall-clock time.
//!
//! Features:
//! - One worker task per connection, all started up front
//! - Random `[A-Z0-9]` keys and values, or sequential `key{n}`/`value{n}`
//! - Optional cap on connections in flight and optional timeouts
//! - Configuration via CLI arguments or TOML file

mod config;
mod load;
mod payload;
mod worker;

use config::Config;
use load::StdoutReporter;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging; stdout is reserved for result lines
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        concurrency = config.concurrency,
        workers = ?config.workers,
        "Starting set-storm"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    let load_config = config.load_config();
    let summary = runtime.block_on(load::run(&load_config, Arc::new(StdoutReporter)));

    // Per-worker failures never change the exit status.
    println!("{summary}");
    Ok(())
}
