use thiserror::Error;

/// Result alias for history backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failure reported by a round history backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend refused to keep a finished round.
    #[error("history rejected round of room {room}: {reason}")]
    Rejected {
        /// Room the round was played in.
        room: String,
        /// Backend-specific reason.
        reason: String,
    },
    /// The query cannot be answered as asked.
    #[error("invalid history query: {0}")]
    InvalidQuery(String),
}
