//! Command-line client: sends one number and prints the server's answer.

use clap::Parser;
use mult_server::client;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mult-client")]
#[command(version = "0.1.0")]
#[command(about = "Ask a mult-server to multiply a number", long_about = None)]
struct Args {
    /// Server hostname or address
    server_hostname: String,

    /// Server port
    port: u16,

    /// Number to multiply
    #[arg(allow_hyphen_values = true)]
    number_to_multiply: String,

    /// Connect/read/write timeout in milliseconds (0 = none)
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();
    let timeout = match args.timeout_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };

    let result = client::request(
        (args.server_hostname.as_str(), args.port),
        &args.number_to_multiply,
        timeout,
    )?;
    println!("Result from server: {result}");
    Ok(())
}
