//! Drift correction between local extrapolation and server truth.
//!
//! Each completed fetch yields a fresh `CountdownSample`. The corrector
//! compares it with what the local clock predicted for the same instant and
//! decides two things:
//! - whether the session is now *stable* (local extrapolation is trustworthy)
//! - whether the fresh sample should replace the clock's current sample
//!
//! Small disagreements are absorbed (hysteresis) so the countdown does not
//! flicker by a second every time a poll lands.

use crate::clock::CountdownSample;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Drift corrector thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Maximum disagreement (seconds) still counted as agreement. Default: 0.5.
    #[serde(default = "default_stability_tolerance_secs")]
    pub stability_tolerance_secs: f64,
    /// Consecutive agreeing reconciliations required to become stable. Default: 1.
    #[serde(default = "default_stability_threshold")]
    pub stability_threshold: u32,
    /// Disagreement (seconds) above which the server sample replaces the
    /// local one. Default: 2.0.
    #[serde(default = "default_snap_tolerance_secs")]
    pub snap_tolerance_secs: f64,
}

fn default_stability_tolerance_secs() -> f64 {
    0.5
}

fn default_stability_threshold() -> u32 {
    1
}

fn default_snap_tolerance_secs() -> f64 {
    2.0
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            stability_tolerance_secs: default_stability_tolerance_secs(),
            stability_threshold: default_stability_threshold(),
            snap_tolerance_secs: default_snap_tolerance_secs(),
        }
    }
}

impl DriftConfig {
    /// Reject thresholds that would make classification meaningless.
    pub fn validate(&self) -> Result<()> {
        if !self.stability_tolerance_secs.is_finite() || self.stability_tolerance_secs < 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "stability_tolerance_secs must be a non-negative number, got {}",
                self.stability_tolerance_secs
            )));
        }
        if !self.snap_tolerance_secs.is_finite() || self.snap_tolerance_secs < 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "snap_tolerance_secs must be a non-negative number, got {}",
                self.snap_tolerance_secs
            )));
        }
        if self.snap_tolerance_secs < self.stability_tolerance_secs {
            return Err(CoreError::InvalidConfig(format!(
                "snap_tolerance_secs ({}) must not be below stability_tolerance_secs ({})",
                self.snap_tolerance_secs, self.stability_tolerance_secs
            )));
        }
        if self.stability_threshold == 0 {
            return Err(CoreError::InvalidConfig(
                "stability_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Decision produced by one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileOutcome {
    /// The fresh server sample.
    pub sample: CountdownSample,
    /// Whether the caller should replace the clock's sample with `sample`.
    pub replace: bool,
    /// Stability after this reconciliation.
    pub is_stable: bool,
    /// Absolute disagreement in seconds; `None` when there was nothing local
    /// to compare against.
    pub delta_secs: Option<f64>,
}

/// Tracks stability across a session and produces snap decisions.
#[derive(Debug)]
pub struct DriftCorrector {
    config: DriftConfig,
    consecutive_agreements: u32,
    stable: bool,
    samples_seen: u64,
}

impl DriftCorrector {
    #[must_use]
    pub fn new(config: DriftConfig) -> Self {
        Self {
            config,
            consecutive_agreements: 0,
            stable: false,
            samples_seen: 0,
        }
    }

    /// Whether local extrapolation is trusted. Monotonic within a session.
    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.stable
    }

    #[must_use]
    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    /// Classify a fresh server sample against the local estimate for the same
    /// instant.
    ///
    /// `local_estimate` is `None` before the clock has any sample. `forced`
    /// reconciliations always replace the sample.
    pub fn reconcile(
        &mut self,
        server_sample: CountdownSample,
        local_estimate: Option<f64>,
        forced: bool,
    ) -> ReconcileOutcome {
        let first = self.samples_seen == 0 || local_estimate.is_none();
        self.samples_seen += 1;

        let delta_secs =
            local_estimate.map(|est| (est - server_sample.server_seconds_remaining as f64).abs());

        if let Some(delta) = delta_secs {
            if !self.stable {
                if delta <= self.config.stability_tolerance_secs {
                    self.consecutive_agreements += 1;
                    if self.consecutive_agreements >= self.config.stability_threshold {
                        self.stable = true;
                        debug!(
                            delta_secs = delta,
                            agreements = self.consecutive_agreements,
                            "Countdown stabilized"
                        );
                    }
                } else {
                    self.consecutive_agreements = 0;
                }
            }
        }

        let snap = delta_secs.is_some_and(|d| d > self.config.snap_tolerance_secs);
        let replace = first || forced || snap;

        ReconcileOutcome {
            sample: server_sample,
            replace,
            is_stable: self.stable,
            delta_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn sample(secs: u64) -> CountdownSample {
        CountdownSample::new(secs, Instant::now())
    }

    #[test]
    fn test_first_sample_always_replaces() {
        let mut dc = DriftCorrector::new(DriftConfig::default());
        let out = dc.reconcile(sample(300), None, false);
        assert!(out.replace);
        assert!(!out.is_stable);
        assert_eq!(out.delta_secs, None);
    }

    #[test]
    fn test_agreeing_sample_stabilizes_without_replacing() {
        let mut dc = DriftCorrector::new(DriftConfig::default());
        dc.reconcile(sample(300), None, false);

        let out = dc.reconcile(sample(290), Some(290.3), false);
        assert!(out.is_stable);
        assert!(!out.replace);
        assert!(dc.is_stable());
    }

    #[test]
    fn test_mid_band_delta_neither_replaces_nor_stabilizes() {
        let mut dc = DriftCorrector::new(DriftConfig::default());
        dc.reconcile(sample(300), None, false);

        // delta = 1.5s: above stability tolerance, below snap tolerance.
        let out = dc.reconcile(sample(100), Some(101.5), false);
        assert_eq!(out.delta_secs, Some(1.5));
        assert!(!out.replace);
        assert!(!out.is_stable);
    }

    #[test]
    fn test_large_delta_snaps() {
        let mut dc = DriftCorrector::new(DriftConfig::default());
        dc.reconcile(sample(300), None, false);

        let out = dc.reconcile(sample(100), Some(104.0), false);
        assert!(out.replace);
        assert!(!out.is_stable);
    }

    #[test]
    fn test_forced_replaces_even_when_agreeing() {
        let mut dc = DriftCorrector::new(DriftConfig::default());
        dc.reconcile(sample(300), None, false);

        let out = dc.reconcile(sample(200), Some(200.1), true);
        assert!(out.replace);
        assert!(out.is_stable);
    }

    #[test]
    fn test_stability_is_monotonic() {
        let mut dc = DriftCorrector::new(DriftConfig::default());
        dc.reconcile(sample(300), None, false);
        dc.reconcile(sample(250), Some(250.0), false);
        assert!(dc.is_stable());

        for (server, local) in [(10, 500.0), (400, 3.0), (0, 0.9), (50, 49.0)] {
            let out = dc.reconcile(sample(server), Some(local), false);
            assert!(out.is_stable);
        }
        assert!(dc.is_stable());
    }

    #[test]
    fn test_multi_sample_threshold_requires_consecutive_agreement() {
        let mut dc = DriftCorrector::new(DriftConfig {
            stability_threshold: 2,
            ..Default::default()
        });
        dc.reconcile(sample(300), None, false);

        assert!(!dc.reconcile(sample(280), Some(280.2), false).is_stable);
        // Disagreement resets the streak.
        assert!(!dc.reconcile(sample(270), Some(271.0), false).is_stable);
        assert!(!dc.reconcile(sample(260), Some(260.0), false).is_stable);
        assert!(dc.reconcile(sample(250), Some(250.4), false).is_stable);
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        assert!(DriftConfig::default().validate().is_ok());
        assert!(DriftConfig {
            stability_threshold: 0,
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(DriftConfig {
            snap_tolerance_secs: -1.0,
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(DriftConfig {
            stability_tolerance_secs: 3.0,
            snap_tolerance_secs: 2.0,
            ..Default::default()
        }
        .validate()
        .is_err());
    }
}
