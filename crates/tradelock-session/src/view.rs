//! Host-facing render model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tradelock_core::{format_countdown, LockPhase, LockState, OfferedItem, TradeId, TradeSnapshot};

/// Session lifecycle phase as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Countdown running, reconciliation active.
    Active,
    /// Both parties locked (or completion announced). Terminal.
    Completed,
    /// Countdown ran out before completion. Terminal.
    Expired,
}

impl SessionPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Descriptive trade fields carried along from the latest fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeDetails {
    pub listing_item_name: String,
    pub requester_name: String,
    pub offered_items: Vec<OfferedItem>,
}

impl From<&TradeSnapshot> for TradeDetails {
    fn from(snapshot: &TradeSnapshot) -> Self {
        Self {
            listing_item_name: snapshot.listing_item_name.clone(),
            requester_name: snapshot.requester_name.clone(),
            offered_items: snapshot.offered_items.clone(),
        }
    }
}

/// Everything a host needs to render one trade session.
///
/// `reconciliations` and `last_synced_at` are bookkeeping: they are kept
/// current on every publish but a change to them alone does not notify
/// subscribers (see `render_differs`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub trade_id: TradeId,
    pub phase: SessionPhase,
    /// Whole seconds left; `None` until the first reconciliation lands.
    pub seconds_remaining: Option<u64>,
    /// `seconds_remaining` rendered as `m:ss`.
    pub countdown_label: Option<String>,
    pub lock: LockState,
    /// 0, 50 or 100, derived from `lock`.
    pub progress: u8,
    /// An optimistic lock is awaiting the action result.
    pub lock_pending: bool,
    pub is_stable: bool,
    /// Reconciliations applied so far.
    pub reconciliations: u64,
    /// Wall-clock time of the latest applied reconciliation.
    pub last_synced_at: Option<DateTime<Utc>>,
    pub details: Option<TradeDetails>,
}

impl SessionView {
    pub(crate) fn initial(trade_id: TradeId) -> Self {
        Self {
            trade_id,
            phase: SessionPhase::Active,
            seconds_remaining: None,
            countdown_label: None,
            lock: LockState::default(),
            progress: 0,
            lock_pending: false,
            is_stable: false,
            reconciliations: 0,
            last_synced_at: None,
            details: None,
        }
    }

    /// Set the countdown and its label together.
    pub(crate) fn with_seconds(mut self, seconds_remaining: Option<u64>) -> Self {
        self.seconds_remaining = seconds_remaining;
        self.countdown_label = seconds_remaining.map(format_countdown);
        self
    }

    /// Set the lock state and its progress together.
    pub(crate) fn with_lock(mut self, lock: LockState) -> Self {
        self.lock = lock;
        self.progress = lock.progress();
        self
    }

    #[must_use]
    pub fn lock_phase(&self) -> LockPhase {
        self.lock.phase()
    }

    /// Whether `other` renders differently, ignoring bookkeeping fields.
    #[must_use]
    pub fn render_differs(&self, other: &Self) -> bool {
        self.trade_id != other.trade_id
            || self.phase != other.phase
            || self.seconds_remaining != other.seconds_remaining
            || self.lock != other.lock
            || self.lock_pending != other.lock_pending
            || self.is_stable != other.is_stable
            || self.details != other.details
    }
}
