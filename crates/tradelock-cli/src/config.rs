//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tradelock_client::HttpGatewayConfig;
use tradelock_core::Party;
use tradelock_session::SessionConfig;

/// Environment variable overriding `auth_token`.
pub const AUTH_TOKEN_ENV: &str = "TRADELOCK_AUTH_TOKEN";

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Marketplace API endpoint and credentials.
    #[serde(flatten)]
    pub gateway: HttpGatewayConfig,
    /// Side the local user acts for. Can be overridden with `--party`.
    #[serde(default)]
    pub party: Option<Party>,
    #[serde(default)]
    pub session: SessionConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let mut config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;

        if let Ok(token) = std::env::var(AUTH_TOKEN_ENV) {
            if !token.is_empty() {
                config.gateway.auth_token = Some(token);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.gateway.api_url.trim().is_empty() {
            return Err(AppError::Config("api_url must not be empty".to_string()));
        }
        if self.gateway.request_timeout_ms == 0 {
            return Err(AppError::Config(
                "request_timeout_ms must be non-zero".to_string(),
            ));
        }
        self.session.validate()?;
        Ok(())
    }

    /// Party from the command line, falling back to the file.
    pub fn resolve_party(&self, cli: Option<Party>) -> AppResult<Party> {
        cli.or(self.party)
            .ok_or_else(|| AppError::Config("party is required (--party or config)".to_string()))
    }
}
