//! TCP server tying the listener, queue, worker pool and shutdown together.
//!
//! `Server::bind` acquires every resource that can fail at startup without
//! spawning anything. `Server::run` starts the workers, drives the accept
//! loop on the calling thread and returns once the pool has drained.

use crate::config::Config;
use crate::runtime::{
    Acceptor, Connection, ConnectionQueue, Service, Shutdown, Stats, StatsSnapshot, WorkerPool,
    WAKER_TOKEN,
};
use mio::{Poll, Waker};
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Server instance
pub struct Server {
    config: Config,
    acceptor: Acceptor,
    queue: Arc<ConnectionQueue<Connection>>,
    shutdown: Arc<Shutdown>,
    stats: Arc<Stats>,
    local_addr: SocketAddr,
}

/// Cloneable control surface for a running server.
#[derive(Clone)]
pub struct ServerHandle {
    queue: Arc<ConnectionQueue<Connection>>,
    shutdown: Arc<Shutdown>,
    stats: Arc<Stats>,
}

impl ServerHandle {
    /// Request shutdown. Returns `false` if it had already been requested.
    pub fn shutdown(&self) -> bool {
        self.shutdown.request()
    }

    pub fn shutdown_token(&self) -> Arc<Shutdown> {
        Arc::clone(&self.shutdown)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Connections accepted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl Server {
    /// Bind the listening socket and prepare shared state.
    pub fn bind(config: Config) -> io::Result<Self> {
        let listener = bind_listener((config.host.as_str(), config.port), config.backlog)?;
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;
        let shutdown = Arc::new(Shutdown::new(waker));
        let queue = Arc::new(ConnectionQueue::new(config.max_connections));
        let stats = Arc::new(Stats::new());

        let acceptor = Acceptor::new(
            poll,
            listener,
            Arc::clone(&queue),
            Arc::clone(&shutdown),
            Arc::clone(&stats),
        )?;

        Ok(Server {
            config,
            acceptor,
            queue,
            shutdown,
            stats,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            queue: Arc::clone(&self.queue),
            shutdown: Arc::clone(&self.shutdown),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Serve until shutdown is requested and every worker has exited.
    ///
    /// Connections still queued at that point are closed without a reply.
    pub fn run(mut self) -> io::Result<StatsSnapshot> {
        let service = Arc::new(Service::from_config(&self.config));
        let pool = WorkerPool::spawn(
            self.config.workers,
            Arc::clone(&self.queue),
            Arc::clone(&self.shutdown),
            service,
            Arc::clone(&self.stats),
        )?;

        info!(
            address = %self.local_addr,
            workers = self.config.workers,
            max_connections = self.queue.capacity(),
            "Server listening"
        );

        let accept_result = self.acceptor.run();
        if let Err(ref e) = accept_result {
            error!(error = %e, "Accept loop failed");
            self.shutdown.request();
        }

        self.queue.close();
        let panicked = pool.join();
        if panicked > 0 {
            warn!(panicked, "Workers exited abnormally");
        }

        let abandoned = self.queue.drain();
        if !abandoned.is_empty() {
            warn!(count = abandoned.len(), "Closing queued connections without reply");
            self.stats.record_abandoned(abandoned.len() as u64);
            for conn in abandoned {
                debug!(peer = %conn.peer(), "Abandoned at shutdown");
                conn.close();
            }
        }

        let stats = self.stats.snapshot();
        info!(
            accepted = stats.accepted,
            rejected = stats.rejected,
            served = stats.served,
            failed = stats.failed,
            abandoned = stats.abandoned,
            "Server stopped"
        );

        accept_result.map(|()| stats)
    }
}

/// Bind to the first resolved address that accepts us.
fn bind_listener<A: ToSocketAddrs>(addr: A, backlog: u32) -> io::Result<TcpListener> {
    let mut last_err = None;
    for candidate in addr.to_socket_addrs()? {
        match create_listener(candidate, backlog) {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                debug!(address = %candidate, error = %e, "Bind failed, trying next address");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "no address to bind to")
    }))
}

/// Create a TCP listener that may reuse a port still in TIME_WAIT.
fn create_listener(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog.min(i32::MAX as u32) as i32)?;

    Ok(socket.into())
}
