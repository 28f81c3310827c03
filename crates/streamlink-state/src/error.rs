//! Error types for the StreamLink state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness rule was violated (second active cluster, duplicate
    /// active service for a cluster/catalog pair).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The record, or a record it requires, was deactivated by a concurrent
    /// delete.
    #[error("no longer active: {0}")]
    Inactive(String),
}
