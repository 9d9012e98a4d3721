//! Two-party lock state machine.
//!
//! A trade completes once both the owner and the requester have locked it.
//! Local lock requests are applied optimistically: the machine snapshots the
//! current state into a `PendingLock`, applies the change, and the caller
//! later either commits or rolls back the command once the lock action
//! resolves.
//!
//! Completion is terminal only once confirmed (by a committed command or by
//! a server/push delta). An optimistic completion can still be rolled back.

use crate::types::Party;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Lock flags of both parties.
///
/// `progress` and `completed` are derived from the two flags, so they can
/// never disagree with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockState {
    pub owner_locked: bool,
    pub requester_locked: bool,
}

impl LockState {
    #[must_use]
    pub const fn new(owner_locked: bool, requester_locked: bool) -> Self {
        Self {
            owner_locked,
            requester_locked,
        }
    }

    /// 0, 50 or 100.
    #[must_use]
    pub const fn progress(&self) -> u8 {
        match (self.owner_locked, self.requester_locked) {
            (true, true) => 100,
            (false, false) => 0,
            _ => 50,
        }
    }

    #[must_use]
    pub const fn completed(&self) -> bool {
        self.owner_locked && self.requester_locked
    }

    #[must_use]
    pub const fn phase(&self) -> LockPhase {
        match self.progress() {
            0 => LockPhase::Idle,
            50 => LockPhase::OneLocked,
            _ => LockPhase::Completed,
        }
    }

    #[must_use]
    pub const fn is_locked_by(&self, party: Party) -> bool {
        match party {
            Party::Owner => self.owner_locked,
            Party::Requester => self.requester_locked,
        }
    }

    fn with_locked(mut self, party: Party) -> Self {
        match party {
            Party::Owner => self.owner_locked = true,
            Party::Requester => self.requester_locked = true,
        }
        self
    }
}

/// Coarse lock phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockPhase {
    Idle,
    OneLocked,
    Completed,
}

impl fmt::Display for LockPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::OneLocked => write!(f, "OneLocked"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

/// Whether an applied delta changed the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed,
    Unchanged,
}

impl Transition {
    #[must_use]
    pub fn is_changed(self) -> bool {
        self == Self::Changed
    }
}

/// Why a lock request was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRejection {
    /// The trade already completed.
    Terminal,
    /// The acting party's flag is already set.
    AlreadyLocked,
    /// Another optimistic lock is still awaiting its action result.
    Pending,
}

impl fmt::Display for LockRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminal => write!(f, "trade already completed"),
            Self::AlreadyLocked => write!(f, "party already locked"),
            Self::Pending => write!(f, "lock action already pending"),
        }
    }
}

/// Optimistic lock command awaiting the collaborator result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingLock {
    /// Acting party.
    pub party: Party,
    /// State before the optimistic change.
    pub snapshot: LockState,
    /// State right after the optimistic change.
    pub applied: LockState,
}

/// Lock state owner.
#[derive(Debug, Default)]
pub struct LockStateMachine {
    state: LockState,
    pending: Option<PendingLock>,
}

impl LockStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> LockState {
        self.state
    }

    #[must_use]
    pub fn pending(&self) -> Option<PendingLock> {
        self.pending
    }

    /// Confirmed completion: no further transitions are accepted.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.completed() && self.pending.is_none()
    }

    /// Optimistically lock for `party`.
    pub fn request_lock(&mut self, party: Party) -> Result<PendingLock, LockRejection> {
        if self.is_terminal() {
            return Err(LockRejection::Terminal);
        }
        if self.pending.is_some() {
            return Err(LockRejection::Pending);
        }
        if self.state.is_locked_by(party) {
            return Err(LockRejection::AlreadyLocked);
        }

        let snapshot = self.state;
        let applied = snapshot.with_locked(party);
        let pending = PendingLock {
            party,
            snapshot,
            applied,
        };
        self.state = applied;
        self.pending = Some(pending);
        debug!(%party, progress = applied.progress(), "Optimistic lock applied");
        Ok(pending)
    }

    /// Accept the optimistic change after the lock action succeeded.
    ///
    /// Returns false if `pending` is not the outstanding command (it was
    /// already resolved, or superseded by a confirmed completion).
    pub fn commit(&mut self, pending: PendingLock) -> bool {
        if self.pending != Some(pending) {
            return false;
        }
        self.pending = None;
        true
    }

    /// Restore the pre-transition snapshot after the lock action failed.
    pub fn rollback(&mut self, pending: PendingLock) -> Transition {
        if self.pending != Some(pending) {
            return Transition::Unchanged;
        }
        self.pending = None;
        let before = self.state;
        self.state = pending.snapshot;
        debug!(
            party = %pending.party,
            progress = self.state.progress(),
            "Optimistic lock rolled back"
        );
        if before == self.state {
            Transition::Unchanged
        } else {
            Transition::Changed
        }
    }

    /// Apply lock flags reported by a server fetch.
    pub fn apply_server_delta(&mut self, owner_locked: bool, requester_locked: bool) -> Transition {
        self.apply_delta(LockState::new(owner_locked, requester_locked))
    }

    /// Apply lock flags delivered by the push channel.
    ///
    /// Same semantics as a server delta; push recency is tracked by the
    /// scheduler, not here.
    pub fn apply_push_delta(&mut self, owner_locked: bool, requester_locked: bool) -> Transition {
        self.apply_delta(LockState::new(owner_locked, requester_locked))
    }

    fn apply_delta(&mut self, next: LockState) -> Transition {
        if self.is_terminal() {
            return Transition::Unchanged;
        }
        // A completion reported by the server supersedes any local guess.
        if next.completed() {
            self.pending = None;
        }
        if self.state == next {
            return Transition::Unchanged;
        }
        self.state = next;
        Transition::Changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_consistent(state: LockState) {
        let locks = u8::from(state.owner_locked) + u8::from(state.requester_locked);
        assert_eq!(state.progress(), locks * 50);
        assert_eq!(state.completed(), state.progress() == 100);
    }

    #[test]
    fn test_progress_invariant() {
        for owner in [false, true] {
            for requester in [false, true] {
                assert_consistent(LockState::new(owner, requester));
            }
        }
        assert_eq!(LockState::new(false, false).phase(), LockPhase::Idle);
        assert_eq!(LockState::new(true, false).phase(), LockPhase::OneLocked);
        assert_eq!(LockState::new(false, true).phase(), LockPhase::OneLocked);
        assert_eq!(LockState::new(true, true).phase(), LockPhase::Completed);
    }

    #[test]
    fn test_request_lock_is_optimistic() {
        let mut m = LockStateMachine::new();
        let pending = m.request_lock(Party::Owner).unwrap();
        assert_eq!(pending.snapshot, LockState::default());
        assert_eq!(m.state().progress(), 50);
        assert_eq!(m.state().phase(), LockPhase::OneLocked);
        assert!(m.commit(pending));
        assert!(m.pending().is_none());
    }

    #[test]
    fn test_rollback_restores_exact_snapshot() {
        let mut m = LockStateMachine::new();
        m.apply_server_delta(false, true);
        let before = m.state();

        let pending = m.request_lock(Party::Owner).unwrap();
        assert!(m.state().completed());
        assert!(!m.is_terminal());

        assert_eq!(m.rollback(pending), Transition::Changed);
        assert_eq!(m.state(), before);
        assert!(m.pending().is_none());
    }

    #[test]
    fn test_request_lock_rejections() {
        let mut m = LockStateMachine::new();
        m.apply_server_delta(true, false);
        assert_eq!(m.request_lock(Party::Owner), Err(LockRejection::AlreadyLocked));

        let _pending = m.request_lock(Party::Requester).unwrap();
        assert_eq!(m.request_lock(Party::Requester), Err(LockRejection::Pending));

        let mut done = LockStateMachine::new();
        done.apply_server_delta(true, true);
        assert_eq!(done.request_lock(Party::Owner), Err(LockRejection::Terminal));
    }

    #[test]
    fn test_identical_delta_is_noop() {
        let mut m = LockStateMachine::new();
        assert_eq!(m.apply_server_delta(false, false), Transition::Unchanged);
        assert_eq!(m.apply_server_delta(true, false), Transition::Changed);
        assert_eq!(m.apply_push_delta(true, false), Transition::Unchanged);
    }

    #[test]
    fn test_server_can_clear_a_lock() {
        let mut m = LockStateMachine::new();
        m.apply_server_delta(true, false);
        assert_eq!(m.apply_server_delta(false, false), Transition::Changed);
        assert_eq!(m.state().progress(), 0);
    }

    #[test]
    fn test_confirmed_completion_is_terminal() {
        let mut m = LockStateMachine::new();
        m.apply_push_delta(true, true);
        assert!(m.is_terminal());
        assert_eq!(m.apply_server_delta(false, false), Transition::Unchanged);
        assert!(m.state().completed());
    }

    #[test]
    fn test_server_completion_supersedes_pending() {
        let mut m = LockStateMachine::new();
        let pending = m.request_lock(Party::Requester).unwrap();
        m.apply_server_delta(true, true);
        assert!(m.is_terminal());

        // The late failure must not undo the confirmed completion.
        assert_eq!(m.rollback(pending), Transition::Unchanged);
        assert!(m.state().completed());
        assert!(!m.commit(pending));
    }

    #[test]
    fn test_arbitrary_delta_sequences_stay_consistent() {
        let mut m = LockStateMachine::new();
        let deltas = [
            (true, false),
            (false, true),
            (false, false),
            (true, false),
            (true, false),
            (false, true),
            (true, true),
            (false, false),
        ];
        for (i, (o, r)) in deltas.into_iter().enumerate() {
            if i % 2 == 0 {
                m.apply_server_delta(o, r);
            } else {
                m.apply_push_delta(o, r);
            }
            assert_consistent(m.state());
        }
        assert!(m.is_terminal());
    }
}
