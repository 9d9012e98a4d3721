//! Session error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] tradelock_core::CoreError),

    #[error("Session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Session already unmounted")]
    Unmounted,
}

pub type SessionResult<T> = Result<T, SessionError>;
