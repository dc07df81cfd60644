//! Focus engine errors

use thiserror::Error;

/// Errors surfaced by the focus engine and its collaborators
#[derive(Error, Debug)]
pub enum FocusError {
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Failed to persist session record: {0}")]
    Persistence(String),

    #[error("Focus engine is no longer running")]
    EngineClosed,

    #[error("Control request rejected: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FocusResult<T> = Result<T, FocusError>;
