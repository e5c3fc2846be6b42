//! Socket client for specialist request/response exchanges
//!
//! Every call opens its own TCP connection, writes one request line and reads
//! the reply. Failures are classified into [`SocketError`] variants and returned
//! as-is; retry policy belongs to callers.

use super::error::SocketError;
use super::stream::ChunkStream;
use crate::config::SocketSection;
use crate::protocol::{
    decode_line, encode_line, ControlMessage, MessageRequest, ResponseEnvelope, MAX_LINE_BYTES,
};
use crate::socket_span;
use crate::transport::{MessageOptions, MessageReply, PingReply, SpecialistTransport};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, Instrument};
use uuid::Uuid;

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Default reply timeout for content messages
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Stateless TCP client for the specialist wire protocol
#[derive(Debug, Clone)]
pub struct SocketClient {
    connect_timeout: Duration,
    default_timeout: Duration,
}

impl Default for SocketClient {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }
}

impl SocketClient {
    pub fn new(connect_timeout: Duration, default_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            default_timeout,
        }
    }

    pub fn from_config(config: &SocketSection) -> Self {
        Self::new(
            Duration::from_millis(config.connect_timeout_ms),
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Connect, bounded by the smaller of the connect timeout and the call budget
    async fn connect(&self, addr: &str, budget: Duration) -> Result<TcpStream, SocketError> {
        let limit = self.connect_timeout.min(budget);
        match timeout(limit, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(SocketError::Connection {
                addr: addr.to_string(),
                source,
            }),
            Err(_) => Err(SocketError::Timeout {
                addr: addr.to_string(),
                timeout: limit,
            }),
        }
    }

    /// Open a connection and write one request line before `deadline`
    ///
    /// `budget` is the whole allowance the deadline was derived from and is
    /// what a timeout error reports.
    async fn open_exchange(
        &self,
        addr: &str,
        request: &[u8],
        deadline: Instant,
        budget: Duration,
    ) -> Result<BufReader<TcpStream>, SocketError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut stream = self.connect(addr, remaining).await?;
        let write = async {
            stream.write_all(request).await?;
            stream.flush().await
        };
        match timeout_at(deadline, write).await {
            Ok(Ok(())) => Ok(BufReader::new(stream)),
            Ok(Err(source)) => Err(SocketError::Connection {
                addr: addr.to_string(),
                source,
            }),
            Err(_) => Err(SocketError::Timeout {
                addr: addr.to_string(),
                timeout: budget,
            }),
        }
    }

    /// Read exactly one reply line; EOF before it is a `PeerClosed`
    async fn read_single_reply(
        reader: &mut BufReader<TcpStream>,
        addr: &str,
        deadline: Instant,
        budget: Duration,
    ) -> Result<String, SocketError> {
        read_reply_line(reader, addr, deadline, budget)
            .await?
            .ok_or_else(|| SocketError::PeerClosed {
                addr: addr.to_string(),
                chunks_received: 0,
            })
    }

    fn build_request(content: &str, options: &MessageOptions, stream: bool) -> MessageRequest {
        let mut request = MessageRequest::new(content);
        request.temperature = options.temperature;
        request.max_tokens = options.max_tokens;
        request.context = options.context.clone();
        if stream {
            request.stream = Some(true);
            request.request_id = Some(Uuid::new_v4().to_string());
        }
        request
    }
}

/// Read the next non-blank reply line before `deadline`
///
/// Returns `Ok(None)` when the peer closed the connection first. At most
/// `MAX_LINE_BYTES + 1` bytes are buffered per line.
pub(super) async fn read_reply_line(
    reader: &mut BufReader<TcpStream>,
    addr: &str,
    deadline: Instant,
    budget: Duration,
) -> Result<Option<String>, SocketError> {
    let read = async {
        let mut line = String::new();
        loop {
            line.clear();
            let read = (&mut *reader)
                .take(MAX_LINE_BYTES as u64 + 1)
                .read_line(&mut line)
                .await?;
            if read == 0 {
                return Ok::<_, std::io::Error>(None);
            }
            if line.len() > MAX_LINE_BYTES || !line.trim().is_empty() {
                return Ok(Some(line));
            }
        }
    };

    match timeout_at(deadline, read).await {
        Ok(Ok(Some(line))) if line.len() > MAX_LINE_BYTES => Err(SocketError::Protocol {
            addr: addr.to_string(),
            reason: format!("reply line exceeds {MAX_LINE_BYTES} bytes"),
        }),
        Ok(Ok(line)) => Ok(line),
        Ok(Err(source)) if source.kind() == std::io::ErrorKind::InvalidData => {
            Err(SocketError::Protocol {
                addr: addr.to_string(),
                reason: format!("reply is not valid UTF-8: {source}"),
            })
        }
        Ok(Err(source)) => Err(SocketError::Connection {
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(SocketError::Timeout {
            addr: addr.to_string(),
            timeout: budget,
        }),
    }
}

/// Point in time `budget` after `start`, saturating for very large budgets
pub(super) fn deadline_after(start: Instant, budget: Duration) -> Instant {
    start
        .checked_add(budget)
        .unwrap_or_else(|| start + Duration::from_secs(60 * 60 * 24 * 365))
}

/// Best-effort view of a ping reply; any non-blank line is a valid answer
fn ping_payload(line: &str) -> Value {
    let trimmed = line.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

#[async_trait]
impl SpecialistTransport for SocketClient {
    async fn ping(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<PingReply, SocketError> {
        let addr = format!("{host}:{port}");
        let span = socket_span!(operation = "ping", addr = %addr);

        async {
            let started = Instant::now();
            let deadline = deadline_after(started, timeout);
            let request = encode_line(&ControlMessage::Ping)?;
            let mut reader = self
                .open_exchange(&addr, &request, deadline, timeout)
                .await?;
            let line = Self::read_single_reply(&mut reader, &addr, deadline, timeout).await?;
            let elapsed = started.elapsed();

            let payload = ping_payload(&line);
            debug!(elapsed_ms = elapsed.as_millis() as u64, "Ping answered");
            Ok(PingReply { elapsed, payload })
        }
        .instrument(span)
        .await
        .map_err(|e: SocketError| {
            debug!(addr = %addr, kind = e.kind(), error = %e, "Ping failed");
            e
        })
    }

    async fn send_message(
        &self,
        host: &str,
        port: u16,
        content: &str,
        options: &MessageOptions,
    ) -> Result<MessageReply, SocketError> {
        let addr = format!("{host}:{port}");
        let reply_timeout = options.timeout.unwrap_or(self.default_timeout);
        let span = socket_span!(operation = "send_message", addr = %addr);

        async {
            let started = Instant::now();
            let deadline = deadline_after(started, reply_timeout);
            let request = encode_line(&Self::build_request(content, options, false))?;
            let mut reader = self
                .open_exchange(&addr, &request, deadline, reply_timeout)
                .await?;
            let line =
                Self::read_single_reply(&mut reader, &addr, deadline, reply_timeout).await?;
            let elapsed = started.elapsed();
            drop(reader);

            let envelope: ResponseEnvelope =
                decode_line(&line).map_err(|reason| SocketError::Protocol {
                    addr: addr.clone(),
                    reason,
                })?;
            if envelope.is_error() {
                return Err(SocketError::Remote {
                    addr: addr.clone(),
                    message: envelope.error_message(),
                });
            }
            let content = envelope.content.clone().ok_or_else(|| SocketError::Protocol {
                addr: addr.clone(),
                reason: "reply has no content field".to_string(),
            })?;

            debug!(elapsed_ms = elapsed.as_millis() as u64, "Message answered");
            Ok(MessageReply {
                content,
                model: envelope.model.clone(),
                elapsed,
                envelope,
            })
        }
        .instrument(span)
        .await
        .map_err(|e| {
            debug!(addr = %addr, kind = e.kind(), error = %e, "Message failed");
            e
        })
    }

    async fn send_message_stream(
        &self,
        host: &str,
        port: u16,
        content: &str,
        options: &MessageOptions,
    ) -> Result<ChunkStream, SocketError> {
        let addr = format!("{host}:{port}");
        let read_timeout = options.timeout.unwrap_or(self.default_timeout);
        let request = encode_line(&Self::build_request(content, options, true))?;
        let deadline = deadline_after(Instant::now(), read_timeout);
        let reader = self
            .open_exchange(&addr, &request, deadline, read_timeout)
            .await?;
        debug!(addr = %addr, "Stream opened");
        Ok(ChunkStream::from_connection(reader, addr, read_timeout))
    }
}
