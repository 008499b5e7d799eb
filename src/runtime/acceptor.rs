//! Accept loop.
//!
//! A single thread waits on a `mio::Poll` that watches the listening socket
//! and the shutdown waker. Each readiness event drains the kernel's accept
//! queue; every new connection is either pushed onto the connection queue or,
//! when the queue is full, closed on the spot.
//!
//! A drain that stops on an accept failure re-polls with a short timeout, so
//! connections left in the backlog are still picked up once resources free.

use crate::runtime::{Connection, ConnectionQueue, Shutdown, Stats};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub(crate) const LISTENER_TOKEN: Token = Token(0);
pub(crate) const WAKER_TOKEN: Token = Token(1);

const EVENT_CAPACITY: usize = 16;

/// How long to wait before retrying accept after running out of resources.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, PartialEq, Eq)]
enum AcceptFailure {
    Interrupted,
    /// The pending connection died; the next one may be fine.
    Connection,
    /// Out of descriptors or memory; nothing can be accepted for now.
    Exhausted,
    Other,
}

fn classify_accept_error(e: &io::Error) -> AcceptFailure {
    match e.kind() {
        io::ErrorKind::Interrupted => return AcceptFailure::Interrupted,
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset => {
            return AcceptFailure::Connection
        }
        _ => {}
    }

    match e.raw_os_error() {
        Some(libc::EPROTO | libc::ENETDOWN | libc::ENETUNREACH | libc::EHOSTUNREACH) => {
            AcceptFailure::Connection
        }
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM) => {
            AcceptFailure::Exhausted
        }
        _ => AcceptFailure::Other,
    }
}

pub struct Acceptor {
    poll: Poll,
    listener: TcpListener,
    queue: Arc<ConnectionQueue<Connection>>,
    shutdown: Arc<Shutdown>,
    stats: Arc<Stats>,
}

impl Acceptor {
    /// Register a non-blocking `listener` with `poll`.
    ///
    /// `poll` must be the one the shutdown token's waker was created on.
    pub fn new(
        poll: Poll,
        listener: TcpListener,
        queue: Arc<ConnectionQueue<Connection>>,
        shutdown: Arc<Shutdown>,
        stats: Arc<Stats>,
    ) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        poll.registry().register(
            &mut SourceFd(&listener.as_raw_fd()),
            LISTENER_TOKEN,
            Interest::READABLE,
        )?;

        Ok(Self {
            poll,
            listener,
            queue,
            shutdown,
            stats,
        })
    }

    /// Run until shutdown is requested.
    ///
    /// Only a failure of the poll itself is returned; accept failures are
    /// logged and the loop keeps going.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        let mut retry_pending = false;

        while !self.shutdown.is_requested() {
            // Readiness is edge-triggered: if the last drain stopped early,
            // nothing will report the connections left in the backlog.
            let timeout = retry_pending.then_some(ACCEPT_RETRY_DELAY);
            match self.poll.poll(&mut events, timeout) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            let listener_ready = events.iter().any(|e| e.token() == LISTENER_TOKEN);
            if listener_ready || retry_pending {
                retry_pending = self.accept_pending();
            }
        }

        debug!("Accept loop stopped");
        Ok(())
    }

    /// Accept until the backlog is empty.
    ///
    /// Returns `true` if the drain stopped while connections may still be
    /// waiting, so the caller has to try again without a readiness event.
    fn accept_pending(&self) -> bool {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    self.admit(stream, peer);
                    if self.shutdown.is_requested() {
                        return false;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return false,
                Err(e) => match classify_accept_error(&e) {
                    AcceptFailure::Interrupted => continue,
                    AcceptFailure::Connection => {
                        debug!(error = %e, "Connection failed before accept completed");
                    }
                    AcceptFailure::Exhausted => {
                        warn!(
                            error = %e,
                            retry_ms = ACCEPT_RETRY_DELAY.as_millis() as u64,
                            "Out of resources accepting connections"
                        );
                        return true;
                    }
                    AcceptFailure::Other => {
                        error!(error = %e, "Failed to accept connection");
                        return true;
                    }
                },
            }
        }
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        self.stats.record_accepted();

        // Workers do blocking I/O. Some platforms hand out sockets that
        // inherit the listener's non-blocking flag.
        if let Err(e) = stream.set_nonblocking(false) {
            warn!(peer = %peer, error = %e, "Failed to configure connection");
            self.stats.record_rejected();
            return;
        }

        match self.queue.try_push(Connection::new(stream, peer)) {
            Ok(queued) => {
                debug!(peer = %peer, queued, "Connection queued");
            }
            Err(conn) => {
                warn!(
                    peer = %peer,
                    capacity = self.queue.capacity(),
                    "Queue full, dropping connection"
                );
                self.stats.record_rejected();
                conn.close();
            }
        }
    }
}
