//! Command-line host for tradelock.
//!
//! Mounts one trade session against the HTTP gateway, drives it from stdin
//! commands and prints every view change as a JSON line.

pub mod app;
pub mod config;
pub mod error;

pub use app::{Application, HostCommand};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
