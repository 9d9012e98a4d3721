//! Integration tests for tradelock-session.
//!
//! These tests drive a mounted session end to end against scripted gateways:
//! - mount, countdown and expiry
//! - optimistic locking, commit and rollback
//! - push deltas, external completion and unmount

pub mod common;
