//! Trade collaborator contracts for tradelock.
//!
//! - `TradeGateway`: fetch trade detail and issue the lock action
//! - `HttpTradeGateway`: reqwest implementation against the marketplace API
//! - `CompletionBus`: cross-view "trade completed" broadcast

pub mod completion;
pub mod error;
pub mod gateway;
pub mod http;

pub use completion::{CompletionBus, CompletionSubscription};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{SharedGateway, TradeGateway};
pub use http::{HttpGatewayConfig, HttpTradeGateway};
