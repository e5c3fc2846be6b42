//! Streaming replies as a lazy chunk sequence
//!
//! A [`ChunkStream`] owns the connection it reads from. The socket is released
//! when the final chunk is read, when an error is yielded, or as soon as the
//! stream is dropped, so a consumer that stops early never drains the peer.

use super::client::{deadline_after, read_reply_line};
use super::error::SocketError;
use crate::protocol::{decode_line, Chunk, ChunkMetadata, StreamLine};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

/// Pull-based sequence of reply chunks; finite and not restartable
pub struct ChunkStream {
    inner: BoxStream<'static, Result<Chunk, SocketError>>,
}

impl ChunkStream {
    /// Wrap any chunk stream, e.g. a scripted one in tests
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Chunk, SocketError>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    /// Read chunks from an already-written connection until the final one
    pub(crate) fn from_connection(
        reader: BufReader<TcpStream>,
        addr: String,
        read_timeout: Duration,
    ) -> Self {
        let state = StreamState {
            reader: Some(reader),
            addr,
            read_timeout,
            chunks_received: 0,
        };
        Self::new(futures::stream::unfold(state, next_chunk))
    }

    /// Drain the stream and concatenate its content
    ///
    /// Returns the joined text and the final chunk's metadata.
    pub async fn collect_content(mut self) -> Result<(String, Option<ChunkMetadata>), SocketError> {
        let mut content = String::new();
        let mut metadata = None;
        while let Some(chunk) = self.next().await {
            let chunk = chunk?;
            content.push_str(&chunk.content);
            if chunk.is_final {
                metadata = chunk.metadata;
            }
        }
        Ok((content, metadata))
    }
}

impl Stream for ChunkStream {
    type Item = Result<Chunk, SocketError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream").finish_non_exhaustive()
    }
}

struct StreamState {
    /// `None` once the stream is finished; dropping the reader closes the socket
    reader: Option<BufReader<TcpStream>>,
    addr: String,
    read_timeout: Duration,
    chunks_received: usize,
}

async fn next_chunk(
    mut state: StreamState,
) -> Option<(Result<Chunk, SocketError>, StreamState)> {
    let mut reader = state.reader.take()?;

    let deadline = deadline_after(Instant::now(), state.read_timeout);
    let read = read_reply_line(&mut reader, &state.addr, deadline, state.read_timeout).await;
    let line = match read {
        Ok(Some(line)) => line,
        Ok(None) => {
            debug!(
                addr = %state.addr,
                chunks = state.chunks_received,
                "Stream closed by peer before final chunk"
            );
            let error = SocketError::PeerClosed {
                addr: state.addr.clone(),
                chunks_received: state.chunks_received,
            };
            return Some((Err(error), state));
        }
        Err(SocketError::Timeout { addr, timeout }) if state.chunks_received > 0 => {
            let error = SocketError::StreamTimeout {
                addr,
                timeout,
                chunks_received: state.chunks_received,
            };
            return Some((Err(error), state));
        }
        Err(error) => return Some((Err(error), state)),
    };

    let parsed: StreamLine = match decode_line(&line) {
        Ok(parsed) => parsed,
        Err(reason) => {
            let error = SocketError::Protocol {
                addr: state.addr.clone(),
                reason,
            };
            return Some((Err(error), state));
        }
    };

    if parsed.kind.as_deref() == Some("error") {
        let error = SocketError::Remote {
            addr: state.addr.clone(),
            message: parsed
                .message
                .clone()
                .unwrap_or_else(|| "stream error".to_string()),
        };
        return Some((Err(error), state));
    }

    state.chunks_received += 1;
    let chunk = Chunk::from(parsed);
    if !chunk.is_final {
        state.reader = Some(reader);
    }
    Some((Ok(chunk), state))
}
