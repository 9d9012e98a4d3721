//! Trade session controller.
//!
//! Wires the countdown clock, drift corrector, sync scheduler and lock state
//! machine into one lifecycle:
//! - mount: forced reconciliation, 1s clock driver, adaptive poll timer
//! - push events, visibility changes, lock requests, external completion
//! - terminal phases (completed, expired) stop every timer
//! - unmount cancels timers and in-flight requests; nothing writes afterwards
//!
//! Each session runs as a single tokio task that owns all mutable state.
//! Hosts interact through `SessionHandle` and render `SessionView`.

pub mod config;
pub mod controller;
pub mod error;
pub mod handle;
pub mod view;

pub use config::SessionConfig;
pub use controller::{ExitReason, SessionExit, SyncReason};
pub use error::{SessionError, SessionResult};
pub use handle::{mount, SessionHandle, SessionMount};
pub use view::{SessionPhase, SessionView, TradeDetails};
