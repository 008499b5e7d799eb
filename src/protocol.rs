//! Multiplication wire protocol.
//!
//! One exchange per connection:
//!
//! ```text
//! Request:  7
//! Response: 70
//! ```
//!
//! The client sends an ASCII decimal integer, the server answers with the
//! ASCII decimal of `value * multiplier` and closes the connection. There is
//! no framing beyond "one read, one write, close": a request split across
//! several TCP segments is only seen up to what the first read returned.

use bytes::{BufMut, BytesMut};

/// Protocol errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload held nothing but whitespace
    Empty,
    /// Payload was not a decimal integer
    InvalidInteger(String),
    /// Product does not fit in a 64-bit integer
    Overflow { value: i64, multiplier: i64 },
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Empty => write!(f, "empty request"),
            ProtocolError::InvalidInteger(s) => write!(f, "invalid integer: {s:?}"),
            ProtocolError::Overflow { value, multiplier } => {
                write!(f, "{value} * {multiplier} overflows")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Parse an ASCII decimal integer, ignoring surrounding whitespace.
///
/// Used for requests on the server side and for replies on the client side.
pub fn parse_integer(input: &[u8]) -> Result<i64, ProtocolError> {
    let trimmed = input.trim_ascii();
    if trimmed.is_empty() {
        return Err(ProtocolError::Empty);
    }

    std::str::from_utf8(trimmed)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ProtocolError::InvalidInteger(String::from_utf8_lossy(trimmed).into_owned()))
}

/// Computes replies for a fixed multiplier.
#[derive(Debug, Clone, Copy)]
pub struct Multiplier {
    factor: i64,
}

impl Multiplier {
    pub fn new(factor: i64) -> Self {
        Self { factor }
    }

    pub fn factor(&self) -> i64 {
        self.factor
    }

    pub fn apply(&self, value: i64) -> Result<i64, ProtocolError> {
        value
            .checked_mul(self.factor)
            .ok_or(ProtocolError::Overflow {
                value,
                multiplier: self.factor,
            })
    }

    /// Parse a raw request and format the reply bytes.
    pub fn respond(&self, request: &[u8]) -> Result<BytesMut, ProtocolError> {
        let value = parse_integer(request)?;
        let product = self.apply(value)?;
        Ok(format_integer(product))
    }
}

/// Format an integer as its ASCII decimal representation.
pub fn format_integer(value: i64) -> BytesMut {
    let digits = value.to_string();
    let mut out = BytesMut::with_capacity(digits.len());
    out.put_slice(digits.as_bytes());
    out
}
