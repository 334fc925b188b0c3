use thiserror::Error;

use crate::ledger::LedgerError;
use crate::model::Event;
use crate::provider::ProviderError;
use crate::registry::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("slot already booked: {} conflicting event(s)", .0.len())]
    Conflict(Vec<Event>),
    #[error("gone: {0}")]
    Gone(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Provider failure other than not-found/gone. Message is the provider's, verbatim.
    #[error("upstream failure: {0}")]
    Upstream(String),
    /// Alias-registry or ledger backend failure.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl EngineError {
    /// HTTP-style status class for the outer layer.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::InvalidInput(_) => 400,
            EngineError::Forbidden(_) => 403,
            EngineError::NotFound(_) => 404,
            EngineError::AlreadyExists(_) | EngineError::Conflict(_) => 409,
            EngineError::Gone(_) => 410,
            EngineError::Storage(_) => 500,
            EngineError::Upstream(_) => 502,
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::Conflict(_) => "conflict",
            EngineError::Gone(_) => "gone",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::Upstream(_) => "upstream",
            EngineError::Storage(_) => "storage",
        }
    }
}

impl From<ProviderError> for EngineError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NotFound(msg) => EngineError::NotFound(msg),
            ProviderError::Gone(msg) => EngineError::Gone(msg),
            ProviderError::Unavailable(msg) => EngineError::Upstream(msg),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(alias) => EngineError::NotFound(format!("calendar {alias}")),
            StoreError::AlreadyExists(alias) => EngineError::AlreadyExists(format!("calendar {alias}")),
            StoreError::Backend(msg) => EngineError::Storage(msg),
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(e: LedgerError) -> Self {
        EngineError::Storage(e.to_string())
    }
}
