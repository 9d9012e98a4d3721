//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Core(#[from] tradelock_core::CoreError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] tradelock_client::GatewayError),

    #[error("Session error: {0}")]
    Session(#[from] tradelock_session::SessionError),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
