//! mult-server binary.
//!
//! Usage: `mult-server [PORT NUM_THREADS MAX_NUM_CONNECTIONS] [OPTIONS]`.
//! SIGINT or SIGTERM stops accepting, lets workers finish the connection
//! they hold, and exits.

use mult_server::runtime::signal;
use mult_server::{Config, Server};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        workers = config.workers,
        max_connections = config.max_connections,
        multiplier = config.multiplier,
        "Starting mult-server"
    );

    let server = Server::bind(config)?;

    // Signals must be blocked before the worker threads exist.
    let _signals = signal::spawn_listener(server.handle().shutdown_token())?;

    server.run()?;
    Ok(())
}
