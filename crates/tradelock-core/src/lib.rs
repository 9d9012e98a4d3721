//! Core domain types for the tradelock reconciliation engine.
//!
//! This crate provides the pure building blocks of a trade session:
//! - `TradeId`, `Party`, `TradeSnapshot`, `PushEvent`: collaborator-facing types
//! - `ClockModel`, `CountdownSample`: local countdown extrapolation
//! - `DriftCorrector`: stable/unstable classification and snap decisions
//! - `LockStateMachine`, `LockState`: two-party lock status with optimistic commands
//!
//! Nothing here owns a timer or performs I/O; the session controller drives
//! these types from its event loop.

pub mod clock;
pub mod drift;
pub mod error;
pub mod lock;
pub mod types;

pub use clock::{format_countdown, ClockModel, CountdownSample};
pub use drift::{DriftConfig, DriftCorrector, ReconcileOutcome};
pub use error::{CoreError, Result};
pub use lock::{LockPhase, LockRejection, LockState, LockStateMachine, PendingLock, Transition};
pub use types::{OfferedItem, Party, PushEvent, TradeId, TradeSnapshot};
