//! Trade collaborator contract.

use crate::error::GatewayResult;
use async_trait::async_trait;
use std::sync::Arc;
use tradelock_core::{TradeId, TradeSnapshot};

/// Backend operations a session depends on.
///
/// Implementations must be cancel-safe: the session drops in-flight calls on
/// teardown.
#[async_trait]
pub trait TradeGateway: Send + Sync {
    /// Fetch the current trade detail.
    async fn fetch_trade(&self, trade_id: &TradeId) -> GatewayResult<TradeSnapshot>;

    /// Lock the trade on behalf of the authenticated party.
    async fn lock_trade(&self, trade_id: &TradeId) -> GatewayResult<()>;
}

/// Gateway shared between a session and its spawned requests.
pub type SharedGateway = Arc<dyn TradeGateway>;
