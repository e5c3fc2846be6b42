//! Failure classification for socket exchanges

use std::time::Duration;
use thiserror::Error;

/// Errors returned by the socket client
///
/// Each failure mode is its own variant so callers can react to it without
/// inspecting message text.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Peer refused the connection, is unreachable, or the connection broke
    /// while the request was being written
    #[error("connection to {addr} failed: {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Nothing usable arrived within the allotted time (connect or first reply)
    #[error("timed out after {timeout:?} waiting for {addr}")]
    Timeout { addr: String, timeout: Duration },

    /// A stream stalled after at least one chunk was delivered
    #[error("stream from {addr} stalled for {timeout:?} after {chunks_received} chunk(s)")]
    StreamTimeout {
        addr: String,
        timeout: Duration,
        chunks_received: usize,
    },

    /// Reply bytes were not a valid JSON line or lacked required fields
    #[error("malformed reply from {addr}: {reason}")]
    Protocol { addr: String, reason: String },

    /// Peer closed the connection before sending a (final) reply
    #[error("{addr} closed the connection after {chunks_received} chunk(s) without a final reply")]
    PeerClosed { addr: String, chunks_received: usize },

    /// Specialist answered with an explicit error reply
    #[error("{addr} reported an error: {message}")]
    Remote { addr: String, message: String },

    /// Request could not be serialized
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SocketError {
    /// True for failures that say the peer is not reachable at all
    pub fn is_unreachable(&self) -> bool {
        matches!(self, SocketError::Connection { .. })
    }

    /// True for every timeout flavour
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SocketError::Timeout { .. } | SocketError::StreamTimeout { .. }
        )
    }

    /// True when the exchange itself broke down, as opposed to the peer
    /// answering with something unusable
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            SocketError::Connection { .. }
                | SocketError::Timeout { .. }
                | SocketError::PeerClosed { .. }
        )
    }

    /// Short machine-friendly label used in logs and events
    pub fn kind(&self) -> &'static str {
        match self {
            SocketError::Connection { .. } => "connection",
            SocketError::Timeout { .. } => "timeout",
            SocketError::StreamTimeout { .. } => "stream_timeout",
            SocketError::Protocol { .. } => "protocol",
            SocketError::PeerClosed { .. } => "peer_closed",
            SocketError::Remote { .. } => "remote",
            SocketError::Encode(_) => "encode",
        }
    }
}
