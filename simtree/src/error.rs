//! Error taxonomy shared by every engine operation.
//!
//! `NotFound` and `Validation` are client-facing outcomes; `Upstream` and
//! `Storage` are server-side faults. Store and model errors arrive as
//! `anyhow::Error` from the I/O layer and are flattened into a message here,
//! keeping their context chain.

use thiserror::Error;

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Upstream,
    Storage,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("model call failed: {0}")]
    Upstream(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Upstream(_) => ErrorKind::Upstream,
            EngineError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound(what.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        EngineError::Validation(reason.into())
    }

    /// Wrap a model-backend error, keeping the full context chain.
    pub fn upstream(err: anyhow::Error) -> Self {
        EngineError::Upstream(format!("{err:#}"))
    }

    /// Wrap a store error, keeping the full context chain.
    pub fn storage(err: anyhow::Error) -> Self {
        EngineError::Storage(format!("{err:#}"))
    }
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;

/// Classify an I/O-layer result at the orchestration boundary.
pub trait ResultExt<T> {
    fn or_storage(self) -> EngineResult<T>;
    fn or_upstream(self) -> EngineResult<T>;
}

impl<T> ResultExt<T> for anyhow::Result<T> {
    fn or_storage(self) -> EngineResult<T> {
        self.map_err(EngineError::storage)
    }

    fn or_upstream(self) -> EngineResult<T> {
        self.map_err(EngineError::upstream)
    }
}
