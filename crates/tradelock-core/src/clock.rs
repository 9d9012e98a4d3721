//! Local countdown extrapolation.
//!
//! A `CountdownSample` pins a server-reported "seconds remaining" to the local
//! monotonic instant at which it was received. The live countdown is derived
//! from the sample and the current instant, so a stalled event loop never
//! makes the displayed value lag behind: the next read simply jumps.

use tokio::time::Instant;

/// Server-reported remaining time pinned to a local instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownSample {
    /// Seconds remaining according to the server.
    pub server_seconds_remaining: u64,
    /// Local instant at which the server value was observed.
    pub sampled_at: Instant,
}

impl CountdownSample {
    #[must_use]
    pub fn new(server_seconds_remaining: u64, sampled_at: Instant) -> Self {
        Self {
            server_seconds_remaining,
            sampled_at,
        }
    }

    /// Remaining milliseconds at `now`, clamped to zero.
    ///
    /// Instants earlier than the sample count as zero elapsed time.
    #[must_use]
    pub fn remaining_ms_at(&self, now: Instant) -> u64 {
        let elapsed_ms = now.saturating_duration_since(self.sampled_at).as_millis();
        let total_ms = u128::from(self.server_seconds_remaining) * 1000;
        u64::try_from(total_ms.saturating_sub(elapsed_ms)).unwrap_or(u64::MAX)
    }

    /// Whole seconds remaining at `now`, rounded down.
    #[must_use]
    pub fn seconds_remaining_at(&self, now: Instant) -> u64 {
        self.remaining_ms_at(now) / 1000
    }

    /// Fractional seconds remaining at `now`.
    #[must_use]
    pub fn estimate_at(&self, now: Instant) -> f64 {
        self.remaining_ms_at(now) as f64 / 1000.0
    }
}

/// Countdown driven by the most recently accepted sample.
///
/// The model has no timer of its own; callers read it on whatever cadence
/// they render at. Replacing the sample is the only way to correct drift.
#[derive(Debug, Default)]
pub struct ClockModel {
    sample: Option<CountdownSample>,
}

impl ClockModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current sample.
    pub fn resample(&mut self, sample: CountdownSample) {
        self.sample = Some(sample);
    }

    /// Whole seconds remaining at `now`, or `None` before the first sample.
    #[must_use]
    pub fn seconds_remaining(&self, now: Instant) -> Option<u64> {
        self.sample.map(|s| s.seconds_remaining_at(now))
    }

    /// Local fractional estimate at `now`, used for drift comparison.
    #[must_use]
    pub fn estimate_at(&self, now: Instant) -> Option<f64> {
        self.sample.map(|s| s.estimate_at(now))
    }

    /// Whether the countdown has run out at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.seconds_remaining(now) == Some(0)
    }
}

/// Render whole seconds as `m:ss` (minutes are not wrapped into hours).
#[must_use]
pub fn format_countdown(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_sample_decreases_with_elapsed_time() {
        let t = Instant::now();
        let sample = CountdownSample::new(100, t);

        assert_eq!(sample.seconds_remaining_at(t), 100);
        assert_eq!(sample.seconds_remaining_at(t + Duration::from_millis(30_000)), 70);
        // Rounded down: 69.5s remaining displays as 69.
        assert_eq!(sample.seconds_remaining_at(t + Duration::from_millis(30_500)), 69);
    }

    #[test]
    fn test_sample_clamps_at_zero() {
        let t = Instant::now();
        let sample = CountdownSample::new(100, t);

        assert_eq!(sample.seconds_remaining_at(t + Duration::from_millis(100_000)), 0);
        assert_eq!(sample.seconds_remaining_at(t + Duration::from_millis(150_000)), 0);
        assert_eq!(sample.estimate_at(t + Duration::from_millis(150_000)), 0.0);
    }

    #[test]
    fn test_estimate_is_fractional() {
        let t = Instant::now();
        let sample = CountdownSample::new(10, t);
        let est = sample.estimate_at(t + Duration::from_millis(2_250));
        assert!((est - 7.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clock_without_sample() {
        let clock = ClockModel::new();
        let now = Instant::now();
        assert_eq!(clock.seconds_remaining(now), None);
        assert!(!clock.is_expired(now));
        assert_eq!(clock.estimate_at(now), None);
    }

    #[test]
    fn test_resample_jumps() {
        let t = Instant::now();
        let mut clock = ClockModel::new();
        clock.resample(CountdownSample::new(60, t));
        let later = t + Duration::from_secs(10);
        assert_eq!(clock.seconds_remaining(later), Some(50));

        clock.resample(CountdownSample::new(40, later));
        assert_eq!(clock.seconds_remaining(later), Some(40));
        assert_eq!(clock.seconds_remaining(later + Duration::from_secs(40)), Some(0));
        assert!(clock.is_expired(later + Duration::from_secs(40)));
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(300), "5:00");
        assert_eq!(format_countdown(59), "0:59");
        assert_eq!(format_countdown(0), "0:00");
        assert_eq!(format_countdown(3_725), "62:05");
    }
}
