//! Poll cadence and ad hoc poll decisions.
//!
//! The scheduler is a plain state holder: every method takes the current
//! instant explicitly and none of them sleeps. The session controller owns the
//! actual timers and asks the scheduler what to do when they fire.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use tradelock_core::{CoreError, Result};

/// Scheduler thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Poll interval while the countdown is unstable (ms). Default: 5,000.
    #[serde(default = "default_unstable_interval_ms")]
    pub unstable_interval_ms: u64,
    /// Poll interval once stable (ms). Default: 30,000.
    #[serde(default = "default_stable_interval_ms")]
    pub stable_interval_ms: u64,
    /// Stabilization window after mount (ms). Default: 45,000.
    #[serde(default = "default_initial_window_ms")]
    pub initial_window_ms: u64,
    /// Reconciliations considered part of the initial sync. Default: 5.
    #[serde(default = "default_initial_sync_count")]
    pub initial_sync_count: u32,
    /// A push newer than this (ms) warrants a poll. Default: 5,000.
    #[serde(default = "default_push_recency_ms")]
    pub push_recency_ms: u64,
    /// No interaction for longer than this (ms) warrants a poll. Default: 120,000.
    #[serde(default = "default_idle_threshold_ms")]
    pub idle_threshold_ms: u64,
}

fn default_unstable_interval_ms() -> u64 {
    5_000
}

fn default_stable_interval_ms() -> u64 {
    30_000
}

fn default_initial_window_ms() -> u64 {
    45_000
}

fn default_initial_sync_count() -> u32 {
    5
}

fn default_push_recency_ms() -> u64 {
    5_000
}

fn default_idle_threshold_ms() -> u64 {
    120_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            unstable_interval_ms: default_unstable_interval_ms(),
            stable_interval_ms: default_stable_interval_ms(),
            initial_window_ms: default_initial_window_ms(),
            initial_sync_count: default_initial_sync_count(),
            push_recency_ms: default_push_recency_ms(),
            idle_threshold_ms: default_idle_threshold_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.unstable_interval_ms == 0 || self.stable_interval_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "poll intervals must be non-zero".to_string(),
            ));
        }
        if self.stable_interval_ms < self.unstable_interval_ms {
            return Err(CoreError::InvalidConfig(format!(
                "stable_interval_ms ({}) must not be shorter than unstable_interval_ms ({})",
                self.stable_interval_ms, self.unstable_interval_ms
            )));
        }
        Ok(())
    }
}

/// Snapshot of scheduler counters for logging.
#[derive(Debug, Clone)]
pub struct SchedulerStats {
    pub reconciliation_count: u32,
    pub foreground: bool,
    pub completed: bool,
    pub ms_since_mount: u128,
    pub ms_since_push: Option<u128>,
    pub ms_since_interaction: u128,
}

/// Adaptive poll scheduler for one session.
#[derive(Debug)]
pub struct SyncScheduler {
    config: SchedulerConfig,
    mounted_at: Instant,
    reconciliation_count: u32,
    last_push_at: Option<Instant>,
    last_interaction_at: Instant,
    foreground: bool,
    completed: bool,
}

impl SyncScheduler {
    /// Create a scheduler for a session mounted at `now`.
    ///
    /// Mounting counts as an interaction and the view starts in the
    /// foreground.
    #[must_use]
    pub fn new(config: SchedulerConfig, now: Instant) -> Self {
        Self {
            config,
            mounted_at: now,
            reconciliation_count: 0,
            last_push_at: None,
            last_interaction_at: now,
            foreground: true,
            completed: false,
        }
    }

    /// Interval until the next recurring poll.
    #[must_use]
    pub fn poll_interval(&self, is_stable: bool) -> Duration {
        if is_stable {
            Duration::from_millis(self.config.stable_interval_ms)
        } else {
            Duration::from_millis(self.config.unstable_interval_ms)
        }
    }

    /// Whether a poll should fire at `now`.
    ///
    /// Always false once completed or while backgrounded. Otherwise true when
    /// any of the following holds:
    /// - still inside the initial window with fewer than the initial sync count
    /// - not yet stable with fewer than the initial sync count
    /// - a push arrived within the push recency window
    /// - the user has been idle past the idle threshold
    #[must_use]
    pub fn should_poll_now(&self, now: Instant, is_stable: bool) -> bool {
        if self.completed || !self.foreground {
            return false;
        }

        let initial_sync = self.reconciliation_count < self.config.initial_sync_count;
        let in_window = now.saturating_duration_since(self.mounted_at)
            < Duration::from_millis(self.config.initial_window_ms);

        let recent_push = self.last_push_at.is_some_and(|at| {
            now.saturating_duration_since(at) < Duration::from_millis(self.config.push_recency_ms)
        });

        let idle = now.saturating_duration_since(self.last_interaction_at)
            > Duration::from_millis(self.config.idle_threshold_ms);

        (in_window && initial_sync) || (!is_stable && initial_sync) || recent_push || idle
    }

    /// Whether the initial sync phase is over.
    #[must_use]
    pub fn past_initial_sync(&self) -> bool {
        self.reconciliation_count >= self.config.initial_sync_count
    }

    /// Count a successfully applied reconciliation.
    pub fn record_reconciliation(&mut self) {
        self.reconciliation_count = self.reconciliation_count.saturating_add(1);
    }

    #[must_use]
    pub fn reconciliation_count(&self) -> u32 {
        self.reconciliation_count
    }

    /// Mark that a push event arrived at `now`.
    pub fn record_push(&mut self, now: Instant) {
        self.last_push_at = Some(now);
    }

    /// Mark user activity at `now`.
    pub fn record_interaction(&mut self, now: Instant) {
        self.last_interaction_at = now;
    }

    /// Update visibility.
    ///
    /// Returns true when the view just came to the foreground, which calls
    /// for an immediate forced reconciliation.
    pub fn set_foreground(&mut self, foreground: bool) -> bool {
        let was = self.foreground;
        self.foreground = foreground;
        if was != foreground {
            debug!(foreground, "Visibility changed");
        }
        foreground && !was
    }

    #[must_use]
    pub fn is_foreground(&self) -> bool {
        self.foreground
    }

    /// Stop all future polls.
    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    #[must_use]
    pub fn stats(&self, now: Instant) -> SchedulerStats {
        SchedulerStats {
            reconciliation_count: self.reconciliation_count,
            foreground: self.foreground,
            completed: self.completed,
            ms_since_mount: now.saturating_duration_since(self.mounted_at).as_millis(),
            ms_since_push: self
                .last_push_at
                .map(|at| now.saturating_duration_since(at).as_millis()),
            ms_since_interaction: now
                .saturating_duration_since(self.last_interaction_at)
                .as_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn scheduler(now: Instant) -> SyncScheduler {
        SyncScheduler::new(SchedulerConfig::default(), now)
    }

    #[test]
    fn test_interval_follows_stability() {
        let s = scheduler(Instant::now());
        assert_eq!(s.poll_interval(false), secs(5));
        assert_eq!(s.poll_interval(true), secs(30));
    }

    #[test]
    fn test_initial_window_polls() {
        let t0 = Instant::now();
        let mut s = scheduler(t0);
        assert!(s.should_poll_now(t0 + secs(10), true));

        for _ in 0..5 {
            s.record_reconciliation();
        }
        assert!(s.past_initial_sync());
        assert!(!s.should_poll_now(t0 + secs(10), true));
    }

    #[test]
    fn test_unstable_polls_outside_window_until_sync_count() {
        let t0 = Instant::now();
        let mut s = scheduler(t0);
        let late = t0 + secs(60);
        s.record_interaction(late);

        assert!(s.should_poll_now(late, false));
        assert!(!s.should_poll_now(late, true));

        for _ in 0..5 {
            s.record_reconciliation();
        }
        assert!(!s.should_poll_now(late, false));
    }

    #[test]
    fn test_recent_push_triggers_poll() {
        let t0 = Instant::now();
        let mut s = scheduler(t0);
        for _ in 0..5 {
            s.record_reconciliation();
        }
        let t = t0 + secs(100);
        s.record_interaction(t);
        assert!(!s.should_poll_now(t, true));

        s.record_push(t);
        assert!(s.should_poll_now(t + secs(4), true));
        assert!(!s.should_poll_now(t + secs(6), true));
    }

    #[test]
    fn test_idle_tab_polls() {
        let t0 = Instant::now();
        let mut s = scheduler(t0);
        for _ in 0..5 {
            s.record_reconciliation();
        }
        assert!(!s.should_poll_now(t0 + secs(120), true));
        assert!(s.should_poll_now(t0 + secs(121), true));
    }

    #[test]
    fn test_background_and_completion_veto() {
        let t0 = Instant::now();
        let mut s = scheduler(t0);
        assert!(!s.set_foreground(false));
        assert!(!s.should_poll_now(t0 + secs(1), false));

        assert!(s.set_foreground(true));
        assert!(!s.set_foreground(true));
        assert!(s.should_poll_now(t0 + secs(1), false));

        s.mark_completed();
        assert!(!s.should_poll_now(t0 + secs(1), false));
    }

    #[test]
    fn test_config_from_toml_with_defaults() {
        let cfg: SchedulerConfig = toml::from_str("stable_interval_ms = 60000").unwrap();
        assert_eq!(cfg.stable_interval_ms, 60_000);
        assert_eq!(cfg.unstable_interval_ms, 5_000);
        assert!(cfg.validate().is_ok());

        let bad = SchedulerConfig {
            stable_interval_ms: 1_000,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_stats_snapshot() {
        let t0 = Instant::now();
        let mut s = scheduler(t0);
        s.record_reconciliation();
        s.record_interaction(t0 + secs(2));
        s.record_push(t0 + secs(5));
        s.set_foreground(false);

        let stats = s.stats(t0 + secs(8));
        assert_eq!(stats.reconciliation_count, 1);
        assert!(!stats.foreground);
        assert!(!stats.completed);
        assert_eq!(stats.ms_since_mount, 8_000);
        assert_eq!(stats.ms_since_push, Some(3_000));
        assert_eq!(stats.ms_since_interaction, 6_000);

        s.mark_completed();
        assert!(s.stats(t0 + secs(8)).completed);
    }
}
