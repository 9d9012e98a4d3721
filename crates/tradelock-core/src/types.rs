//! Collaborator-facing trade types.
//!
//! `TradeSnapshot` mirrors the trade detail fetch response and `PushEvent`
//! mirrors the push channel payloads. Both tolerate unknown fields so that
//! server-side additions never break reconciliation.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique trade identifier as issued by the marketplace backend.
///
/// Deserialization goes through `TradeId::new`, so wire frames are held to
/// the same rules as ids built in code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradeId(String);

impl TradeId {
    /// Create a trade id, rejecting empty or whitespace-only values.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidTradeId("empty".to_string()));
        }
        if trimmed.contains('/') {
            return Err(CoreError::InvalidTradeId(format!(
                "'{trimmed}' contains a path separator"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TradeId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for TradeId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<TradeId> for String {
    fn from(id: TradeId) -> Self {
        id.0
    }
}

/// Side of the trade the local user acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    /// Listing owner (receives the offer).
    Owner,
    /// User who made the offer.
    Requester,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Requester => write!(f, "requester"),
        }
    }
}

impl FromStr for Party {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "requester" => Ok(Self::Requester),
            other => Err(CoreError::InvalidParty(other.to_string())),
        }
    }
}

/// Item offered by the requester in exchange for the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferedItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Trade detail as returned by the fetch endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSnapshot {
    /// Server-side seconds until the trade window closes.
    pub seconds_remaining: u64,
    pub owner_locked: bool,
    pub requester_locked: bool,
    #[serde(default)]
    pub listing_item_name: String,
    #[serde(default)]
    pub requester_name: String,
    #[serde(default)]
    pub offered_items: Vec<OfferedItem>,
}

impl TradeSnapshot {
    /// Parse a snapshot from a raw JSON body.
    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }
}

/// Push channel payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PushEvent {
    /// Authoritative lock status change.
    #[serde(rename_all = "camelCase")]
    LockDelta {
        trade_id: TradeId,
        owner_locked: bool,
        requester_locked: bool,
    },
    /// Out-of-band broadcast that the trade finished.
    #[serde(rename_all = "camelCase")]
    TradeCompleted { trade_id: TradeId },
}

impl PushEvent {
    pub fn trade_id(&self) -> &TradeId {
        match self {
            Self::LockDelta { trade_id, .. } | Self::TradeCompleted { trade_id } => trade_id,
        }
    }

    /// Parse a push event from a raw JSON frame.
    pub fn from_json(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }
}
