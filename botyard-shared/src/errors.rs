//! Error types used across the botyard executor.

use thiserror::Error;

/// Result type for botyard operations.
pub type BotyardResult<T> = Result<T, BotyardError>;

#[derive(Debug, Error)]
pub enum BotyardError {
    /// No live record matched the lookup.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store refused the insert (e.g. a live record already holds the owner key).
    #[error("not created: {0}")]
    NotCreated(String),

    /// An update matched no row or was rolled back.
    #[error("not updated: {0}")]
    NotUpdated(String),

    /// A soft delete matched no row (missing, running or already deleted).
    #[error("not deleted: {0}")]
    NotDeleted(String),

    /// The runtime does not know the container id the record points at.
    #[error("no such container: {0}")]
    NoSuchContainer(String),

    #[error("port allocation failed: {0}")]
    PortAllocation(String),

    /// A lifecycle transition was rejected.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Store unreachable or SQL failure.
    #[error("database error: {0}")]
    Database(String),

    /// Runtime daemon unreachable or API failure.
    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The shutdown sweep left at least one container running.
    #[error("sweep incomplete: {0}")]
    SweepIncomplete(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BotyardError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BotyardError::NotFound(_))
    }

    pub fn is_no_such_container(&self) -> bool {
        matches!(self, BotyardError::NoSuchContainer(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BotyardError::Cancelled(_))
    }
}

// Implement From for common error types to enable `?` operator
impl From<std::io::Error> for BotyardError {
    fn from(err: std::io::Error) -> Self {
        BotyardError::Internal(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for BotyardError {
    fn from(err: serde_json::Error) -> Self {
        BotyardError::Internal(format!("JSON error: {}", err))
    }
}

impl From<String> for BotyardError {
    fn from(err: String) -> Self {
        BotyardError::Internal(err)
    }
}

impl From<&str> for BotyardError {
    fn from(err: &str) -> Self {
        BotyardError::Internal(err.to_string())
    }
}
