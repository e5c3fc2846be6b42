//! TCP socket transport speaking line-delimited JSON
//!
//! - [`client`] - request/response and ping exchanges
//! - [`stream`] - chunked replies as a pull-based stream owning its connection
//! - [`error`] - failure classification

pub mod client;
pub mod error;
pub mod stream;

pub use client::SocketClient;
pub use error::SocketError;
pub use stream::ChunkStream;
