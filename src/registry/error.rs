use thiserror::Error;

/// Errors returned by registry accessors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("specialist not found: {0}")]
    NotFound(String),

    #[error("health monitor is already running")]
    AlreadyRunning,

    #[error("invalid specialist definition: {0}")]
    InvalidSpec(String),
}

impl RegistryError {
    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound(id.into())
    }
}
