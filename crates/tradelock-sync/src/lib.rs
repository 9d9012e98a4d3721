//! Adaptive reconciliation scheduling for tradelock sessions.
//!
//! Decides when a session should poll the trade detail endpoint:
//! - 5s cadence until the countdown is stable, 30s afterwards
//! - aggressive polling during the initial stabilization window
//! - extra polls after recent push traffic or a long idle period
//! - no polling while the view is backgrounded or the trade is done

pub mod scheduler;

pub use scheduler::{SchedulerConfig, SchedulerStats, SyncScheduler};
