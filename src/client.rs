//! Blocking client for the multiplication protocol.

use crate::protocol::{parse_integer, ProtocolError};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

/// Largest reply the client will read.
pub const MAX_REPLY_SIZE: u64 = 256;

/// Client errors
#[derive(Debug)]
pub enum ClientError {
    Connect(io::Error),
    Send(io::Error),
    Receive(io::Error),
    /// Server closed the connection without answering
    Rejected,
    Protocol(ProtocolError),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Connect(e) => write!(f, "Unable to connect to server: {e}"),
            ClientError::Send(e) => write!(f, "Unable to send: {e}"),
            ClientError::Receive(e) => write!(f, "Unable to read: {e}"),
            ClientError::Rejected => write!(f, "Connection closed by server without a reply"),
            ClientError::Protocol(e) => write!(f, "Malformed reply: {e}"),
        }
    }
}

impl std::error::Error for ClientError {}

/// Connect to the first resolved address that answers.
pub fn connect<A: ToSocketAddrs>(addr: A, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let mut last_err = None;
    for candidate in addr.to_socket_addrs()? {
        let attempt = match timeout {
            Some(t) => TcpStream::connect_timeout(&candidate, t),
            None => TcpStream::connect(candidate),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(address = %candidate, error = %e, "Connect failed, trying next address");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "host resolved to no addresses")
    }))
}

/// Send `payload` and return the integer the server answers with.
pub fn request<A: ToSocketAddrs>(
    addr: A,
    payload: &str,
    timeout: Option<Duration>,
) -> Result<i64, ClientError> {
    let mut stream = connect(addr, timeout).map_err(ClientError::Connect)?;
    stream
        .set_read_timeout(timeout)
        .and_then(|_| stream.set_write_timeout(timeout))
        .map_err(ClientError::Connect)?;

    stream
        .write_all(payload.as_bytes())
        .map_err(ClientError::Send)?;

    // The server closes after its single write, so EOF frames the reply.
    let mut reply = Vec::new();
    match (&mut stream).take(MAX_REPLY_SIZE).read_to_end(&mut reply) {
        Ok(_) => {}
        Err(e) if reply.is_empty() && e.kind() == io::ErrorKind::ConnectionReset => {
            return Err(ClientError::Rejected)
        }
        Err(e) => return Err(ClientError::Receive(e)),
    }
    if reply.is_empty() {
        return Err(ClientError::Rejected);
    }

    parse_integer(&reply).map_err(ClientError::Protocol)
}
