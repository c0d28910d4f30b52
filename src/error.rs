//! Error taxonomy for core operations.
//!
//! Every operation rejects bad input (`Validation`), wrong-state transitions
//! (`Conflict`), wrong actors (`Permission`) and missing rows (`NotFound`)
//! before anything is persisted; storage failures roll the whole transaction
//! back, so no error leaves a partially applied mutation behind.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad or missing input; nothing was persisted.
    #[error("{0}")]
    Validation(String),
    /// The resource is not in the state the operation requires.
    #[error("{0}")]
    Conflict(String),
    /// The actor is not allowed to perform the operation.
    #[error("{0}")]
    Permission(String),
    #[error("{0}")]
    NotFound(String),
    /// A stored value failed to decode (e.g. a non-decimal amount column).
    #[error("corrupt stored value: {0}")]
    Decode(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
