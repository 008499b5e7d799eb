//! Connection admission and worker dispatch.
//!
//! Threads and what they share:
//! - `Acceptor`: one thread accepting connections into the queue
//! - `WorkerPool`: N threads taking connections off the queue
//! - `ConnectionQueue`: the only lock-protected state between them
//! - `Shutdown`: atomic flag plus waker, observed by all of the above
//! - `signal`: optional thread turning SIGINT/SIGTERM into a shutdown request

mod acceptor;
mod connection;
mod queue;
mod shutdown;
pub mod signal;
mod stats;
mod worker;

pub use acceptor::Acceptor;
pub(crate) use acceptor::WAKER_TOKEN;
pub use connection::{Connection, Service, ServiceError};
pub use queue::ConnectionQueue;
pub use shutdown::Shutdown;
pub use stats::{Stats, StatsSnapshot};
pub use worker::WorkerPool;
