//! Transport layer for specialist communication
//!
//! This module provides the transport abstraction used by the health monitor and
//! the routing engine, and the TCP socket implementation of it.

use crate::protocol::ResponseEnvelope;
use serde_json::Value;
use std::time::Duration;

pub mod socket;

pub use socket::{ChunkStream, SocketClient, SocketError};

/// Per-request options for content messages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageOptions {
    /// Reply timeout; the client default applies when absent
    pub timeout: Option<Duration>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub context: Option<Value>,
}

impl MessageOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Default::default()
        }
    }
}

/// Successful ping exchange
#[derive(Debug, Clone, PartialEq)]
pub struct PingReply {
    /// Wall-clock round trip, connect included
    pub elapsed: Duration,
    /// Reply object as sent by the specialist
    pub payload: Value,
}

/// Successful single-shot exchange
#[derive(Debug, Clone, PartialEq)]
pub struct MessageReply {
    pub content: String,
    pub model: Option<String>,
    pub elapsed: Duration,
    pub envelope: ResponseEnvelope,
}

/// Transport trait for specialist communication
///
/// Implementations are stateless across calls: every call opens its own
/// connection and never retries.
#[async_trait::async_trait]
pub trait SpecialistTransport: Send + Sync {
    /// Send a ping and wait for one reply line
    async fn ping(&self, host: &str, port: u16, timeout: Duration)
        -> Result<PingReply, SocketError>;

    /// Send a content message and read exactly one reply line
    async fn send_message(
        &self,
        host: &str,
        port: u16,
        content: &str,
        options: &MessageOptions,
    ) -> Result<MessageReply, SocketError>;

    /// Send a streaming content message; the returned stream owns the connection
    async fn send_message_stream(
        &self,
        host: &str,
        port: u16,
        content: &str,
        options: &MessageOptions,
    ) -> Result<ChunkStream, SocketError>;
}
