//! Wire protocol spoken by specialist processes
//!
//! Every exchange is line-delimited JSON over a request-scoped TCP connection:
//! the client writes one request line and reads one or more reply lines.

pub mod framing;
pub mod messages;

pub use framing::*;
pub use messages::*;
