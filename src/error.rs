//! Crate-level error type
//!
//! Each subsystem has its own error enum; [`FleetError`] wraps them for callers
//! that drive the whole control plane (the binary, integration tests).

use crate::config::ConfigError;
use crate::registry::RegistryError;
use crate::routing::{DispatchError, RoutingError};
use crate::transport::SocketError;
use thiserror::Error;

/// Main error type for control plane operations
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),

    #[error("Status server error: {0}")]
    StatusServer(#[from] warp::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl FleetError {
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            FleetError::Config(_) | FleetError::InvalidInput { .. } => 2,
            FleetError::Routing(_) | FleetError::Dispatch(DispatchError::Routing(_)) => 3,
            _ => 1,
        }
    }
}

/// Result type for control plane operations
pub type FleetResult<T> = Result<T, FleetError>;
