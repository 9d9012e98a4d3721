//! Scripted trade gateway for integration tests.
//!
//! Serves a trade whose remaining time is derived from a deadline on the
//! tokio clock, so tests with paused time see a server that agrees with the
//! local countdown. Fetches and lock actions can be gated (held until the
//! test releases a permit) or made to fail.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tradelock_client::{GatewayError, GatewayResult, TradeGateway};
use tradelock_core::{Party, TradeId, TradeSnapshot};

struct TradeState {
    deadline: Instant,
    owner_locked: bool,
    requester_locked: bool,
}

/// A gateway backed by in-memory trade state.
pub struct MockGateway {
    state: Mutex<TradeState>,
    /// Party whose flag a successful lock sets.
    party: Party,
    fetch_started: AtomicUsize,
    fetch_completed: AtomicUsize,
    lock_calls: AtomicUsize,
    fail_fetch: AtomicBool,
    fail_lock: AtomicBool,
    fetch_gate: Option<Arc<Semaphore>>,
    lock_gate: Option<Arc<Semaphore>>,
}

impl MockGateway {
    /// Trade ending `remaining` from now, with no locks.
    pub fn new(remaining: Duration, party: Party) -> Self {
        Self {
            state: Mutex::new(TradeState {
                deadline: Instant::now() + remaining,
                owner_locked: false,
                requester_locked: false,
            }),
            party,
            fetch_started: AtomicUsize::new(0),
            fetch_completed: AtomicUsize::new(0),
            lock_calls: AtomicUsize::new(0),
            fail_fetch: AtomicBool::new(false),
            fail_lock: AtomicBool::new(false),
            fetch_gate: None,
            lock_gate: None,
        }
    }

    /// Hold every fetch until a permit is added to the returned semaphore.
    pub fn with_fetch_gate(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.fetch_gate = Some(gate.clone());
        (self, gate)
    }

    /// Hold every lock action until a permit is added to the returned semaphore.
    pub fn with_lock_gate(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.lock_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn set_locks(&self, owner_locked: bool, requester_locked: bool) {
        let mut state = self.state.lock();
        state.owner_locked = owner_locked;
        state.requester_locked = requester_locked;
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_lock(&self, fail: bool) {
        self.fail_lock.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_started(&self) -> usize {
        self.fetch_started.load(Ordering::SeqCst)
    }

    pub fn fetch_completed(&self) -> usize {
        self.fetch_completed.load(Ordering::SeqCst)
    }

    pub fn lock_calls(&self) -> usize {
        self.lock_calls.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> TradeSnapshot {
        let state = self.state.lock();
        TradeSnapshot {
            seconds_remaining: state
                .deadline
                .saturating_duration_since(Instant::now())
                .as_secs(),
            owner_locked: state.owner_locked,
            requester_locked: state.requester_locked,
            listing_item_name: "Film camera".to_string(),
            requester_name: "sam".to_string(),
            offered_items: Vec::new(),
        }
    }
}

#[async_trait]
impl TradeGateway for MockGateway {
    async fn fetch_trade(&self, _trade_id: &TradeId) -> GatewayResult<TradeSnapshot> {
        self.fetch_started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.fetch_gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.fetch_completed.fetch_add(1, Ordering::SeqCst);

        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout);
        }
        Ok(self.snapshot())
    }

    async fn lock_trade(&self, _trade_id: &TradeId) -> GatewayResult<()> {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.lock_gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        if self.fail_lock.load(Ordering::SeqCst) {
            return Err(GatewayError::LockRejected("trade is not lockable".to_string()));
        }
        let mut state = self.state.lock();
        match self.party {
            Party::Owner => state.owner_locked = true,
            Party::Requester => state.requester_locked = true,
        }
        Ok(())
    }
}
