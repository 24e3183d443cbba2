//! Transport-level failure type used for retry classification.

use std::fmt;

/// Connection-level failure category reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Peer reset the connection (ECONNRESET).
    ConnectionReset,
    /// Nothing listening on the other side (ECONNREFUSED).
    ConnectionRefused,
    /// Host or network route unavailable (EHOSTUNREACH, EHOSTDOWN, ENETUNREACH).
    HostUnreachable,
    /// Local network interface down (ENETDOWN).
    NetworkDown,
    /// DNS lookup failed (ENOTFOUND).
    NameResolution,
    /// Write to a closed socket (EPIPE).
    BrokenPipe,
    /// Socket closed before the response was complete.
    SocketClosed,
    /// Connect or read timed out.
    Timeout,
    /// Anything else the transport could not map.
    Other,
}

impl TransportErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportErrorKind::ConnectionReset => "connection reset",
            TransportErrorKind::ConnectionRefused => "connection refused",
            TransportErrorKind::HostUnreachable => "host unreachable",
            TransportErrorKind::NetworkDown => "network down",
            TransportErrorKind::NameResolution => "name resolution failed",
            TransportErrorKind::BrokenPipe => "broken pipe",
            TransportErrorKind::SocketClosed => "socket closed",
            TransportErrorKind::Timeout => "timed out",
            TransportErrorKind::Other => "transport error",
        }
    }
}

/// Error reported by the transport below the retry layer (curl failure,
/// premature close, DNS, ...). Cloneable so it can be re-surfaced after a
/// failed resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind.as_str())
        } else {
            write!(f, "{}: {}", self.kind.as_str(), self.message)
        }
    }
}

impl std::error::Error for TransportError {}
