use crate::domain::activity_chain::ChainIntegrityError;
use crate::domain::time_window::TimeWindowViolation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("{operation} failed with status {status}: {body}")]
    HttpStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("Validation error: {0}")]
    Validation(#[from] TimeWindowViolation),
    #[error("Integrity error: {0}")]
    Integrity(#[from] ChainIntegrityError),
    #[error("Route resolution failed: {0}")]
    RouteResolution(String),
    #[error("Map lifecycle failure: {0}")]
    MapLifecycle(String),
    #[error("State lock poisoned: {0}")]
    LockPoisoned(String),
}

impl From<reqwest::Error> for InfraError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl InfraError {
    pub fn poisoned(resource: &str, error: impl std::fmt::Display) -> Self {
        Self::LockPoisoned(format!("{resource} lock poisoned: {error}"))
    }
}
