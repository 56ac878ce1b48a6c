//! Core types: the decoded wire value and the error taxonomy.

use std::fmt;
use std::io;

use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// Line terminator written on every encoded line.
pub const CRLF: &[u8] = b"\r\n";

/// Largest bulk payload accepted on the wire (512 MiB).
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Largest element count accepted for a multibulk request.
pub const MAX_MULTIBULK_LEN: i64 = 1024 * 1024;

/// Longest line that may be buffered while waiting for its terminator.
pub const MAX_INLINE_LEN: usize = 64 * 1024;

/// A single decoded wire value.
///
/// Arrays are header-only: `Array(n)` carries the declared element count and
/// the elements themselves arrive as separate items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// Sigil-less command line, e.g. `PING`.
    Inline(Bytes),
    /// `+OK`
    SimpleString(Bytes),
    /// `-ERR message`
    Error(Bytes),
    /// `:1000`
    Integer(i64),
    /// `$6\r\nfoobar`; `None` is the null bulk `$-1`.
    Bulk(Option<Bytes>),
    /// `*2`; `-1` is the null array.
    Array(i64),
}

impl Item {
    /// Build an error item from a message without the leading `-`.
    pub fn error(message: impl Into<Bytes>) -> Self {
        Item::Error(message.into())
    }

    /// Build a non-null bulk item.
    pub fn bulk(payload: impl Into<Bytes>) -> Self {
        Item::Bulk(Some(payload.into()))
    }

    /// Canonical wire encoding, appended to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        crate::frame::encode_item(self, dst);
    }

    /// Canonical wire encoding as an owned buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// The wire sigil for this item, `None` for inline commands.
    pub fn sigil(&self) -> Option<u8> {
        match self {
            Item::Inline(_) => None,
            Item::SimpleString(_) => Some(b'+'),
            Item::Error(_) => Some(b'-'),
            Item::Integer(_) => Some(b':'),
            Item::Bulk(_) => Some(b'$'),
            Item::Array(_) => Some(b'*'),
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Inline(v) => write!(f, "inline({:?})", String::from_utf8_lossy(v)),
            Item::SimpleString(v) => write!(f, "string({:?})", String::from_utf8_lossy(v)),
            Item::Error(v) => write!(f, "error({:?})", String::from_utf8_lossy(v)),
            Item::Integer(i) => write!(f, "integer({i})"),
            Item::Bulk(None) => write!(f, "bulk(nil)"),
            Item::Bulk(Some(v)) => write!(f, "bulk({:?})", String::from_utf8_lossy(v)),
            Item::Array(n) => write!(f, "array({n})"),
        }
    }
}

/// Malformed input on the wire. These are fatal for the stream they occur on.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid integer")]
    InvalidInteger,

    #[error("invalid bulk length")]
    InvalidBulkLength,

    #[error("invalid multibulk length")]
    InvalidMultibulkLength,

    #[error("expected '$', got '{0}'")]
    ExpectedBulk(char),

    #[error("unexpected '{0}' at start of request")]
    UnexpectedRequest(char),

    #[error("bad line terminator")]
    BadTerminator,

    #[error("too big inline request")]
    LineTooLong,

    #[error("unexpected end of stream")]
    Incomplete,
}

impl ProtocolError {
    /// The error reply sent to a client when this error ends its session.
    pub fn reply(&self) -> Bytes {
        Item::error(format!("ERR Protocol error: {self}")).to_bytes()
    }
}

/// Main error type for the proxy.
#[derive(Debug, Error)]
pub enum RcpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("malformed redirect: {0}")]
    BadRedirect(String),

    #[error("too many redirects ({0} hops)")]
    TooManyRedirects(usize),

    #[error("ASK redirect to {0} not supported")]
    AskUnsupported(String),

    #[error("backend closed the connection")]
    BackendClosed,

    #[error("configuration error: {0}")]
    Config(String),
}

impl RcpError {
    /// Protocol-structured reply for this error, if it has one.
    pub fn reply(&self) -> Option<Bytes> {
        match self {
            RcpError::Protocol(e) => Some(e.reply()),
            _ => None,
        }
    }
}
