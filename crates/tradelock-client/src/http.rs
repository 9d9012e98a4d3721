//! HTTP gateway for the marketplace trade API.
//!
//! Endpoints:
//! - `GET  {api_url}/trades/{id}`      trade detail (`TradeSnapshot` JSON)
//! - `POST {api_url}/trades/{id}/lock` lock action (2xx = success)

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::TradeGateway;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use tradelock_core::{TradeId, TradeSnapshot};

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpGatewayConfig {
    /// API base URL (e.g., "https://market.example.com/api").
    pub api_url: String,
    /// Bearer token of the acting user.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Per-request timeout (ms). Default: 10,000.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl HttpGatewayConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            auth_token: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Error body returned by the lock endpoint.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// reqwest-backed `TradeGateway`.
pub struct HttpTradeGateway {
    client: Client,
    api_url: String,
    auth_token: Option<String>,
}

impl HttpTradeGateway {
    pub fn new(config: &HttpGatewayConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| GatewayError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn trade_url(&self, trade_id: &TradeId) -> String {
        format!("{}/trades/{}", self.api_url, trade_id)
    }

    fn lock_url(&self, trade_id: &TradeId) -> String {
        format!("{}/trades/{}/lock", self.api_url, trade_id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl TradeGateway for HttpTradeGateway {
    async fn fetch_trade(&self, trade_id: &TradeId) -> GatewayResult<TradeSnapshot> {
        let url = self.trade_url(trade_id);
        debug!(%url, "Fetching trade detail");

        let response = self.authorize(self.client.get(&url)).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        TradeSnapshot::from_json(&body)
            .map_err(|e| GatewayError::Parse(format!("Failed to parse trade detail: {e}")))
    }

    async fn lock_trade(&self, trade_id: &TradeId) -> GatewayResult<()> {
        let url = self.lock_url(trade_id);
        debug!(%url, "Sending lock action");

        let response = self.authorize(self.client.post(&url)).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), %trade_id, "Lock action rejected");

        if status.is_client_error() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| body.clone());
            return Err(GatewayError::LockRejected(message));
        }

        Err(GatewayError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_strip_trailing_slash() {
        let gw = HttpTradeGateway::new(&HttpGatewayConfig::new("https://api.example.com/v1/"))
            .unwrap();
        let id = TradeId::new("t-7").unwrap();
        assert_eq!(gw.trade_url(&id), "https://api.example.com/v1/trades/t-7");
        assert_eq!(gw.lock_url(&id), "https://api.example.com/v1/trades/t-7/lock");
    }

    #[test]
    fn test_config_defaults() {
        let cfg: HttpGatewayConfig =
            serde_json::from_str(r#"{"api_url": "http://localhost:8080"}"#).unwrap();
        assert_eq!(cfg.request_timeout_ms, 10_000);
        assert!(cfg.auth_token.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        let cfg = HttpGatewayConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            auth_token: Some("token".to_string()),
            request_timeout_ms: 500,
        };
        let gw = HttpTradeGateway::new(&cfg).unwrap();
        let id = TradeId::new("t-1").unwrap();
        assert!(gw.fetch_trade(&id).await.is_err());
        assert!(gw.lock_trade(&id).await.is_err());
    }
}
