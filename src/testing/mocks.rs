//! Mock transport for testing
//!
//! [`MockTransport`] answers pings and messages from a per-port script instead
//! of opening sockets, and records every call it receives.

use crate::protocol::{Chunk, ChunkMetadata, ResponseEnvelope};
use crate::registry::SpecialistSpec;
use crate::transport::{
    ChunkStream, MessageOptions, MessageReply, PingReply, SocketError, SpecialistTransport,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// How a scripted port behaves
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Answer after `delay`; a delay beyond the caller's timeout is a timeout
    Respond { delay: Duration },
    /// Connection refused
    Refuse,
    /// Accept but never answer
    Silent,
    /// Answer pings, reject messages with an error reply
    RemoteError(String),
}

impl MockBehavior {
    pub fn healthy() -> Self {
        MockBehavior::Respond {
            delay: Duration::ZERO,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        MockBehavior::Respond { delay }
    }
}

/// One recorded call
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub operation: &'static str,
    pub port: u16,
    pub content: Option<String>,
}

/// Scripted [`SpecialistTransport`]
#[derive(Debug, Clone)]
pub struct MockTransport {
    behaviors: Arc<Mutex<HashMap<u16, MockBehavior>>>,
    default_behavior: MockBehavior,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Every port answers immediately unless scripted otherwise
    pub fn new() -> Self {
        Self::with_default(MockBehavior::healthy())
    }

    pub fn with_default(default_behavior: MockBehavior) -> Self {
        Self {
            behaviors: Arc::new(Mutex::new(HashMap::new())),
            default_behavior,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn set_behavior(&self, port: u16, behavior: MockBehavior) {
        self.behaviors.lock().await.insert(port, behavior);
    }

    pub async fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().await.clone()
    }

    /// Calls of one operation (`ping`, `send_message`, `send_message_stream`)
    pub async fn calls_of(&self, operation: &str) -> Vec<MockCall> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    pub async fn clear_history(&self) {
        self.calls.lock().await.clear();
    }

    async fn behavior_for(&self, port: u16) -> MockBehavior {
        self.behaviors
            .lock()
            .await
            .get(&port)
            .cloned()
            .unwrap_or_else(|| self.default_behavior.clone())
    }

    async fn record(&self, operation: &'static str, port: u16, content: Option<&str>) {
        self.calls.lock().await.push(MockCall {
            operation,
            port,
            content: content.map(str::to_string),
        });
    }

    /// Wait out the scripted behaviour; `Ok(elapsed)` when the peer answers
    async fn answer(
        behavior: &MockBehavior,
        addr: &str,
        timeout: Duration,
    ) -> Result<Duration, SocketError> {
        match behavior {
            MockBehavior::Respond { delay } if *delay <= timeout => {
                tokio::time::sleep(*delay).await;
                Ok(*delay)
            }
            MockBehavior::Respond { .. } | MockBehavior::Silent => {
                tokio::time::sleep(timeout).await;
                Err(SocketError::Timeout {
                    addr: addr.to_string(),
                    timeout,
                })
            }
            MockBehavior::Refuse => Err(SocketError::Connection {
                addr: addr.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            }),
            MockBehavior::RemoteError(_) => Ok(Duration::ZERO),
        }
    }

    fn reply_text(content: &str) -> String {
        format!("echo: {content}")
    }
}

#[async_trait]
impl SpecialistTransport for MockTransport {
    async fn ping(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<PingReply, SocketError> {
        self.record("ping", port, None).await;
        let addr = format!("{host}:{port}");
        let behavior = self.behavior_for(port).await;
        let elapsed = Self::answer(&behavior, &addr, timeout).await?;
        Ok(PingReply {
            elapsed,
            payload: json!({"type": "pong"}),
        })
    }

    async fn send_message(
        &self,
        host: &str,
        port: u16,
        content: &str,
        options: &MessageOptions,
    ) -> Result<MessageReply, SocketError> {
        self.record("send_message", port, Some(content)).await;
        let addr = format!("{host}:{port}");
        let behavior = self.behavior_for(port).await;
        let timeout = options.timeout.unwrap_or(Duration::from_secs(30));
        let elapsed = Self::answer(&behavior, &addr, timeout).await?;

        if let MockBehavior::RemoteError(message) = behavior {
            return Err(SocketError::Remote { addr, message });
        }

        let text = Self::reply_text(content);
        Ok(MessageReply {
            content: text.clone(),
            model: Some("mock".to_string()),
            elapsed,
            envelope: ResponseEnvelope {
                content: Some(text),
                model: Some("mock".to_string()),
                ..Default::default()
            },
        })
    }

    async fn send_message_stream(
        &self,
        host: &str,
        port: u16,
        content: &str,
        options: &MessageOptions,
    ) -> Result<ChunkStream, SocketError> {
        self.record("send_message_stream", port, Some(content)).await;
        let addr = format!("{host}:{port}");
        let behavior = self.behavior_for(port).await;
        let timeout = options.timeout.unwrap_or(Duration::from_secs(30));
        Self::answer(&behavior, &addr, timeout).await?;

        if let MockBehavior::RemoteError(message) = behavior {
            return Err(SocketError::Remote { addr, message });
        }

        let words: Vec<String> = Self::reply_text(content)
            .split_inclusive(' ')
            .map(str::to_string)
            .collect();
        let last = words.len().saturating_sub(1);
        let chunks: Vec<Result<Chunk, SocketError>> = words
            .into_iter()
            .enumerate()
            .map(|(i, word)| {
                Ok(Chunk {
                    content: word,
                    is_final: i == last,
                    metadata: (i == last).then(|| ChunkMetadata {
                        model: Some("mock".to_string()),
                        ..Default::default()
                    }),
                })
            })
            .collect();
        Ok(ChunkStream::new(futures::stream::iter(chunks)))
    }
}

/// Spec helper for tests: `id` on localhost with the given capabilities
pub fn mock_spec(id: &str, port: u16, capabilities: &[&str]) -> SpecialistSpec {
    SpecialistSpec::new(id, "127.0.0.1", port).with_capabilities(capabilities.iter().copied())
}
