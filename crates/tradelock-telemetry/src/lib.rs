//! Prometheus metrics and structured logging for tradelock.
//!
//! - Structured logging with tracing (pretty in development, JSON in production)
//! - Prometheus counters for reconciliations, drift snaps, lock outcomes and
//!   session lifecycle

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
