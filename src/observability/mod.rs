//! Observability: structured logging and the HTTP status endpoint

pub mod logging;
pub mod status_server;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use status_server::StatusServer;

pub use logging::{lifecycle_span, probe_span, route_span, socket_span};
