//! Session controller event loop.
//!
//! One task per mounted session owns the clock, drift corrector, scheduler
//! and lock machine. Every state write happens inside `SessionController`,
//! so there is a single writer and no locking.
//!
//! Timers and requests owned by the loop:
//! - clock tick (1s): refreshes the displayed countdown, detects expiry
//! - poll timer: re-armed with the scheduler's interval after every fire
//! - delayed forced reconciliations (`DelayQueue`)
//! - in-flight fetches and lock actions (`JoinSet`s)
//!
//! All of them are dropped or aborted in `teardown`, after which the loop
//! returns and the view sender is dropped with it.

use crate::config::SessionConfig;
use crate::view::{SessionPhase, SessionView, TradeDetails};
use chrono::{DateTime, Utc};
use std::fmt;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::{debug, error, info, warn};
use tradelock_client::{CompletionSubscription, GatewayResult, SharedGateway};
use tradelock_core::{
    ClockModel, CountdownSample, DriftCorrector, LockStateMachine, Party, PendingLock, PushEvent,
    TradeId, TradeSnapshot,
};
use tradelock_sync::SyncScheduler;
use tradelock_telemetry::Metrics;
use uuid::Uuid;

/// Fetches allowed in flight at once: one regular plus one forced extra.
const MAX_FETCHES_IN_FLIGHT: usize = 2;

/// Why a reconciliation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReason {
    /// Initial fetch on mount.
    Mount,
    /// Recurring poll timer.
    Scheduled,
    /// View returned to the foreground.
    Foreground,
    /// Confirmation after a successful lock action.
    LockConfirm,
    /// Re-derivation after a failed lock action.
    LockRollback,
    /// Corroboration of a push delta.
    PushCorroboration,
}

impl SyncReason {
    /// Everything except the recurring poll bypasses the re-entrancy guard.
    #[must_use]
    pub fn is_forced(self) -> bool {
        !matches!(self, Self::Scheduled)
    }
}

impl fmt::Display for SyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mount => write!(f, "mount"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Foreground => write!(f, "foreground"),
            Self::LockConfirm => write!(f, "lock_confirm"),
            Self::LockRollback => write!(f, "lock_rollback"),
            Self::PushCorroboration => write!(f, "push_corroboration"),
        }
    }
}

/// Why the session loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Completed,
    Expired,
    Unmounted,
}

impl ExitReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Unmounted => "unmounted",
        }
    }
}

/// Summary returned when the session task finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionExit {
    pub session_id: Uuid,
    pub reason: ExitReason,
    /// Reconciliations applied during the session.
    pub reconciliations: u64,
}

/// Host commands.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    RequestLock,
    SetVisibility(bool),
    Interaction,
}

/// Result of one fetch task.
struct FetchOutcome {
    reason: SyncReason,
    result: GatewayResult<TradeSnapshot>,
}

/// Result of one lock action task.
struct LockOutcome {
    pending: PendingLock,
    result: GatewayResult<()>,
}

/// Inputs the loop listens on besides its own timers.
pub(crate) struct SessionInputs {
    pub commands: mpsc::Receiver<SessionCommand>,
    pub push: Option<mpsc::Receiver<PushEvent>>,
    pub completion: Option<CompletionSubscription>,
}

pub(crate) struct SessionController {
    session_id: Uuid,
    trade_id: TradeId,
    party: Party,
    config: SessionConfig,
    gateway: SharedGateway,
    clock: ClockModel,
    drift: DriftCorrector,
    scheduler: SyncScheduler,
    lock: LockStateMachine,
    phase: SessionPhase,
    details: Option<TradeDetails>,
    reconciliations: u64,
    last_synced_at: Option<DateTime<Utc>>,
    fetches: JoinSet<FetchOutcome>,
    lock_actions: JoinSet<LockOutcome>,
    delayed: DelayQueue<SyncReason>,
    corroboration_key: Option<delay_queue::Key>,
    shutdown: CancellationToken,
    view_tx: watch::Sender<SessionView>,
}

impl SessionController {
    pub(crate) fn new(
        session_id: Uuid,
        trade_id: TradeId,
        party: Party,
        config: SessionConfig,
        gateway: SharedGateway,
        shutdown: CancellationToken,
        view_tx: watch::Sender<SessionView>,
    ) -> Self {
        let now = Instant::now();
        Self {
            session_id,
            trade_id,
            party,
            drift: DriftCorrector::new(config.drift.clone()),
            scheduler: SyncScheduler::new(config.scheduler.clone(), now),
            config,
            gateway,
            clock: ClockModel::new(),
            lock: LockStateMachine::new(),
            phase: SessionPhase::Active,
            details: None,
            reconciliations: 0,
            last_synced_at: None,
            fetches: JoinSet::new(),
            lock_actions: JoinSet::new(),
            delayed: DelayQueue::new(),
            corroboration_key: None,
            shutdown,
            view_tx,
        }
    }

    /// Run until a terminal phase or unmount.
    pub(crate) async fn run(mut self, inputs: SessionInputs) -> SessionExit {
        let SessionInputs {
            mut commands,
            push,
            completion,
        } = inputs;
        let mut push_rx = push;
        let mut completion = completion;

        Metrics::session_mounted();
        info!(party = %self.party, "Trade session mounted");

        self.reconcile(SyncReason::Mount);

        let tick = self.config.clock_tick();
        let mut clock_tick = tokio::time::interval_at(Instant::now() + tick, tick);
        clock_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let poll_timer = tokio::time::sleep(self.scheduler.poll_interval(false));
        tokio::pin!(poll_timer);

        let reason = loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break ExitReason::Unmounted,

                Some(joined) = self.fetches.join_next(), if !self.fetches.is_empty() => {
                    match joined {
                        Ok(outcome) => self.on_fetch_finished(outcome),
                        Err(e) => self.on_task_failed("fetch", e),
                    }
                }

                Some(joined) = self.lock_actions.join_next(), if !self.lock_actions.is_empty() => {
                    match joined {
                        Ok(outcome) => self.on_lock_resolved(outcome),
                        Err(e) => self.on_task_failed("lock", e),
                    }
                }

                _ = clock_tick.tick() => self.on_clock_tick(),

                _ = &mut poll_timer => {
                    self.on_poll_timer();
                    let next = self.scheduler.poll_interval(self.drift.is_stable());
                    poll_timer.as_mut().reset(Instant::now() + next);
                }

                Some(expired) = std::future::poll_fn(|cx| self.delayed.poll_expired(cx)),
                    if !self.delayed.is_empty() =>
                {
                    let reason = expired.into_inner();
                    if reason == SyncReason::PushCorroboration {
                        self.corroboration_key = None;
                    }
                    self.reconcile(reason);
                }

                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd),
                    // Every handle is gone: nobody can render or unmount anymore.
                    None => break ExitReason::Unmounted,
                },

                event = recv_push(&mut push_rx), if push_rx.is_some() => match event {
                    Some(event) => self.on_push(event),
                    None => {
                        debug!("Push channel closed, continuing on polling only");
                        push_rx = None;
                    }
                },

                done = wait_completion(&mut completion), if completion.is_some() => {
                    if done {
                        self.complete("external");
                    } else {
                        completion = None;
                    }
                }
            }

            match self.phase {
                SessionPhase::Active => {}
                SessionPhase::Completed => break ExitReason::Completed,
                SessionPhase::Expired => break ExitReason::Expired,
            }
        };

        self.teardown(reason);
        SessionExit {
            session_id: self.session_id,
            reason,
            reconciliations: self.reconciliations,
        }
    }

    fn on_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::RequestLock => self.on_request_lock(),
            SessionCommand::SetVisibility(visible) => {
                if self.scheduler.set_foreground(visible) {
                    self.reconcile(SyncReason::Foreground);
                }
            }
            SessionCommand::Interaction => self.scheduler.record_interaction(Instant::now()),
        }
    }

    /// Start a fetch unless the re-entrancy guard drops it.
    fn reconcile(&mut self, reason: SyncReason) {
        if self.phase.is_terminal() {
            return;
        }

        let forced = reason.is_forced();
        let in_flight = self.fetches.len();
        let admitted = in_flight == 0 || (forced && in_flight < MAX_FETCHES_IN_FLIGHT);
        if !admitted {
            debug!(%reason, in_flight, "Reconciliation dropped, fetch already in flight");
            Metrics::reconciliation(forced, "dropped");
            return;
        }

        debug!(%reason, in_flight, "Starting reconciliation");
        let gateway = self.gateway.clone();
        let trade_id = self.trade_id.clone();
        self.fetches.spawn(async move {
            let result = gateway.fetch_trade(&trade_id).await;
            FetchOutcome { reason, result }
        });
    }

    fn on_fetch_finished(&mut self, outcome: FetchOutcome) {
        let forced = outcome.reason.is_forced();
        match outcome.result {
            Ok(snapshot) => self.apply_snapshot(&snapshot, outcome.reason),
            Err(e) => {
                // Stability and cadence are untouched; the next tick retries.
                warn!(reason = %outcome.reason, error = %e, "Reconciliation failed");
                Metrics::reconciliation(forced, "failed");
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: &TradeSnapshot, reason: SyncReason) {
        if self.phase.is_terminal() {
            return;
        }

        let now = Instant::now();
        let sample = CountdownSample::new(snapshot.seconds_remaining, now);
        let outcome = self
            .drift
            .reconcile(sample, self.clock.estimate_at(now), reason.is_forced());

        if let Some(delta) = outcome.delta_secs {
            Metrics::drift(delta);
        }
        if outcome.replace {
            if outcome.delta_secs.is_some() {
                Metrics::sample_snap();
            }
            self.clock.resample(outcome.sample);
        }

        self.scheduler.record_reconciliation();
        self.reconciliations += 1;
        self.last_synced_at = Some(Utc::now());
        Metrics::reconciliation(reason.is_forced(), "ok");

        let transition = self
            .lock
            .apply_server_delta(snapshot.owner_locked, snapshot.requester_locked);
        self.details = Some(TradeDetails::from(snapshot));

        debug!(
            %reason,
            server_secs = snapshot.seconds_remaining,
            delta_secs = ?outcome.delta_secs,
            replaced = outcome.replace,
            stable = outcome.is_stable,
            lock_changed = transition.is_changed(),
            "Reconciliation applied"
        );

        if self.lock.is_terminal() {
            self.complete("server");
            return;
        }
        self.check_expiry(now);
        self.publish(now);
    }

    fn on_request_lock(&mut self) {
        if self.phase.is_terminal() {
            debug!(phase = %self.phase, "Lock request ignored in terminal phase");
            return;
        }

        match self.lock.request_lock(self.party) {
            Ok(pending) => {
                self.publish(Instant::now());
                let gateway = self.gateway.clone();
                let trade_id = self.trade_id.clone();
                self.lock_actions.spawn(async move {
                    let result = gateway.lock_trade(&trade_id).await;
                    LockOutcome { pending, result }
                });
            }
            Err(rejection) => debug!(%rejection, "Lock request ignored"),
        }
    }

    fn on_lock_resolved(&mut self, outcome: LockOutcome) {
        match outcome.result {
            Ok(()) => {
                if !self.lock.commit(outcome.pending) {
                    debug!("Lock action succeeded after being superseded");
                    return;
                }
                Metrics::lock_action("committed");
                info!(party = %outcome.pending.party, "Lock action confirmed");

                if self.lock.is_terminal() {
                    self.complete("lock");
                    return;
                }
                self.publish(Instant::now());
                self.delayed
                    .insert(SyncReason::LockConfirm, self.config.lock_confirm_delay());
            }
            Err(e) => {
                warn!(party = %outcome.pending.party, error = %e, "Lock action failed, rolling back");
                if self.lock.rollback(outcome.pending).is_changed() {
                    Metrics::lock_action("rolled_back");
                }
                self.publish(Instant::now());
                self.reconcile(SyncReason::LockRollback);
            }
        }
    }

    fn on_push(&mut self, event: PushEvent) {
        if event.trade_id() != &self.trade_id {
            debug!(other = %event.trade_id(), "Ignoring push for another trade");
            return;
        }

        match event {
            PushEvent::TradeCompleted { .. } => self.complete("push"),
            PushEvent::LockDelta {
                owner_locked,
                requester_locked,
                ..
            } => {
                let now = Instant::now();
                self.scheduler.record_push(now);
                let transition = self.lock.apply_push_delta(owner_locked, requester_locked);

                if self.lock.is_terminal() {
                    self.complete("push");
                    return;
                }
                if transition.is_changed() {
                    self.publish(now);
                }

                if self.drift.is_stable()
                    && self.scheduler.past_initial_sync()
                    && self.corroboration_key.is_none()
                {
                    let key = self.delayed.insert(
                        SyncReason::PushCorroboration,
                        self.config.push_corroboration_delay(),
                    );
                    self.corroboration_key = Some(key);
                }
            }
        }
    }

    fn on_clock_tick(&mut self) {
        let now = Instant::now();
        self.check_expiry(now);
        self.publish(now);
    }

    fn on_poll_timer(&mut self) {
        let now = Instant::now();
        if self.scheduler.should_poll_now(now, self.drift.is_stable()) {
            self.reconcile(SyncReason::Scheduled);
        } else {
            let stats = self.scheduler.stats(now);
            debug!(
                count = stats.reconciliation_count,
                foreground = stats.foreground,
                completed = stats.completed,
                ms_since_mount = stats.ms_since_mount,
                ms_since_push = ?stats.ms_since_push,
                ms_since_interaction = stats.ms_since_interaction,
                "Scheduled poll skipped"
            );
        }
    }

    fn on_task_failed(&mut self, kind: &str, e: JoinError) {
        if e.is_cancelled() {
            return;
        }
        error!(kind, error = %e, "Session task panicked");
        if kind == "lock" {
            // The command's result is lost; re-derive from the server.
            if let Some(pending) = self.lock.pending() {
                self.lock.rollback(pending);
                self.publish(Instant::now());
            }
            self.reconcile(SyncReason::LockRollback);
        }
    }

    fn check_expiry(&mut self, now: Instant) {
        if self.phase.is_terminal() || self.lock.state().completed() {
            return;
        }
        if self.clock.is_expired(now) {
            self.phase = SessionPhase::Expired;
            self.scheduler.mark_completed();
            Metrics::session_terminal(ExitReason::Expired.as_str());
            info!("Trade countdown expired before completion");
        }
    }

    fn complete(&mut self, source: &str) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = SessionPhase::Completed;
        self.scheduler.mark_completed();
        Metrics::session_terminal(ExitReason::Completed.as_str());
        info!(source, "Trade completed");
        self.publish(Instant::now());
    }

    fn publish(&self, now: Instant) {
        let view = SessionView {
            phase: self.phase,
            lock_pending: self.lock.pending().is_some(),
            is_stable: self.drift.is_stable(),
            reconciliations: self.reconciliations,
            last_synced_at: self.last_synced_at,
            details: self.details.clone(),
            ..SessionView::initial(self.trade_id.clone())
        }
        .with_seconds(self.clock.seconds_remaining(now))
        .with_lock(self.lock.state());

        // Bookkeeping is always stored; subscribers only wake on a render change.
        self.view_tx.send_if_modified(|current| {
            let changed = current.render_differs(&view);
            *current = view;
            changed
        });
    }

    fn teardown(&mut self, reason: ExitReason) {
        self.fetches.abort_all();
        self.lock_actions.abort_all();
        self.delayed.clear();
        self.corroboration_key = None;
        self.shutdown.cancel();

        if reason == ExitReason::Unmounted && !self.phase.is_terminal() {
            Metrics::session_terminal(reason.as_str());
        }
        Metrics::session_unmounted();
        info!(
            reason = reason.as_str(),
            reconciliations = self.reconciliations,
            "Trade session torn down"
        );
    }
}

async fn recv_push(rx: &mut Option<mpsc::Receiver<PushEvent>>) -> Option<PushEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_completion(sub: &mut Option<CompletionSubscription>) -> bool {
    match sub {
        Some(sub) => sub.completed().await,
        None => std::future::pending().await,
    }
}
