//! Error taxonomy for the awards desk.
//!
//! Configuration problems are fatal for the requested operation and carry an
//! actionable message. Store errors are recoverable at the call site via the
//! local fallback. Lock conflicts are non-fatal rejections: nothing was
//! mutated and the caller may retry after the lock expires.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AwardsError>;

#[derive(Error, Debug)]
pub enum AwardsError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("record store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("local store error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("lock conflict: {0}")]
    LockConflict(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("notification error: {0}")]
    Notify(String),

    #[error("evidence store error: {0}")]
    Evidence(String),
}
