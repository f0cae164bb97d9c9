//! Error types for the enumeration, cache and reconciliation engine

use thiserror::Error;

/// Engine errors
///
/// Provider failures are carried unchanged in [`Error::Provider`]; the engine
/// never interprets or retries them.
#[derive(Error, Debug)]
pub enum Error {
    /// Raw response contained keys without a mapping rule (strict mode).
    /// All offending keys are reported together.
    #[error("{kind}: unmapped keys in provider response: {}", keys.join(", "))]
    UnmappedKeys { kind: &'static str, keys: Vec<String> },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{count} existing {kind} resources match '{key}'")]
    AmbiguousResource {
        kind: &'static str,
        key: String,
        count: usize,
    },

    #[error("{kind}: {operation} is not supported")]
    NotSupported {
        kind: &'static str,
        operation: &'static str,
    },

    #[error(transparent)]
    Provider(anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Whether the caller can fix this by adding a mapping rule
    pub fn is_mapping(&self) -> bool {
        matches!(self, Error::UnmappedKeys { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
