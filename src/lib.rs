//! mult-server: a bounded worker-pool TCP server
//!
//! Clients connect, send an ASCII integer and receive it multiplied by a
//! configured factor, one exchange per connection.
//!
//! Features:
//! - Fixed pool of worker threads fed by a bounded connection queue
//! - Drop-newest admission control when the queue is full
//! - Graceful shutdown on SIGINT/SIGTERM that finishes in-flight exchanges
//! - Configuration via CLI arguments or TOML file

pub mod client;
pub mod config;
pub mod protocol;
pub mod runtime;
pub mod server;

pub use config::Config;
pub use server::{Server, ServerHandle};
