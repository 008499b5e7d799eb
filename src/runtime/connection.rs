//! Accepted client connections and the exchange performed on each.
//!
//! A connection is owned by the queue until a worker takes it, then by that
//! worker until it is closed. Closing is dropping: `close` consumes the
//! connection so the socket can never outlive the exchange.

use crate::config::Config;
use crate::protocol::{Multiplier, ProtocolError};
use bytes::BytesMut;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use tracing::{debug, trace};

/// How a worker services one connection.
#[derive(Debug, Clone)]
pub struct Service {
    multiplier: Multiplier,
    max_message_size: usize,
    io_timeout: Option<Duration>,
}

impl Service {
    pub fn new(multiplier: Multiplier, max_message_size: usize, io_timeout: Option<Duration>) -> Self {
        Self {
            multiplier,
            max_message_size,
            io_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Multiplier::new(config.multiplier),
            config.max_message_size,
            config.io_timeout(),
        )
    }
}

/// Why an exchange was abandoned.
#[derive(Debug)]
pub enum ServiceError {
    /// Peer closed before sending anything
    Eof,
    Read(io::Error),
    Protocol(ProtocolError),
    Write(io::Error),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Eof => write!(f, "peer closed before sending a request"),
            ServiceError::Read(e) => write!(f, "read failed: {e}"),
            ServiceError::Protocol(e) => write!(f, "bad request: {e}"),
            ServiceError::Write(e) => write!(f, "write failed: {e}"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Read(e) | ServiceError::Write(e) => Some(e),
            ServiceError::Protocol(e) => Some(e),
            ServiceError::Eof => None,
        }
    }
}

impl From<ProtocolError> for ServiceError {
    fn from(e: ProtocolError) -> Self {
        ServiceError::Protocol(e)
    }
}

/// A single accepted client.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self { stream, peer }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Read one request, write one reply.
    ///
    /// Returns the number of reply bytes written. There is no retry: any
    /// failure abandons the exchange and the caller closes the connection.
    pub fn serve(&mut self, service: &Service) -> Result<usize, ServiceError> {
        if let Some(timeout) = service.io_timeout {
            self.stream
                .set_read_timeout(Some(timeout))
                .and_then(|_| self.stream.set_write_timeout(Some(timeout)))
                .map_err(ServiceError::Read)?;
        }

        let mut buf = BytesMut::zeroed(service.max_message_size);
        let n = loop {
            match self.stream.read(&mut buf[..]) {
                Ok(n) => break n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ServiceError::Read(e)),
            }
        };
        if n == 0 {
            return Err(ServiceError::Eof);
        }
        buf.truncate(n);
        trace!(peer = %self.peer, bytes = n, "Request received");

        let reply = service.multiplier.respond(&buf)?;
        self.stream
            .write_all(&reply)
            .map_err(ServiceError::Write)?;

        Ok(reply.len())
    }

    /// Close the socket.
    pub fn close(self) {
        debug!(peer = %self.peer, "Connection closed");
    }
}
