//! Exponential backoff with jitter for the readiness wait.

use std::time::Duration;

use rand::Rng;

use crate::config::ProbeConfig;

/// Delay schedule between readiness attempts, plus the overall deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
    deadline: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            max: max.max(initial),
            multiplier: multiplier.max(1.0),
            jitter: false,
            deadline: None,
        }
    }

    /// Constant interval with no deadline: poll until the database shows up.
    pub fn fixed(interval: Duration) -> Self {
        Self::new(interval, interval, 1.0)
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn from_config(cfg: &ProbeConfig) -> Self {
        let deadline = match cfg.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self::new(
            Duration::from_millis(cfg.initial_interval_ms),
            Duration::from_millis(cfg.max_interval_ms),
            cfg.multiplier,
        )
        .with_jitter(cfg.jitter)
        .with_deadline(deadline)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Delay to sleep after the `attempt`-th failed probe (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let scaled = self.initial.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = scaled.min(self.max.as_millis() as f64) as u64;

        // 0 to 10% on top of the capped delay
        let jitter_range = capped_ms / 10;
        let jitter = if self.jitter && jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped_ms + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_then_caps() {
        let b = Backoff::new(Duration::from_millis(100), Duration::from_millis(1000), 2.0);
        assert_eq!(b.delay(1), Duration::from_millis(100));
        assert_eq!(b.delay(2), Duration::from_millis(200));
        assert_eq!(b.delay(3), Duration::from_millis(400));
        assert_eq!(b.delay(5), Duration::from_millis(1000));
        assert_eq!(b.delay(60), Duration::from_millis(1000));
    }

    #[test]
    fn fixed_interval_never_changes() {
        let b = Backoff::fixed(Duration::from_secs(2));
        assert_eq!(b.delay(1), Duration::from_secs(2));
        assert_eq!(b.delay(1_000), Duration::from_secs(2));
        assert_eq!(b.deadline(), None);
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let b = Backoff::new(Duration::from_millis(1000), Duration::from_millis(1000), 2.0)
            .with_jitter(true);
        for attempt in 1..50 {
            let d = b.delay(attempt).as_millis();
            assert!((1000..1100).contains(&d), "delay {d} out of range");
        }
    }

    #[test]
    fn from_config_maps_zero_timeout_to_forever() {
        let mut cfg = ProbeConfig::default();
        assert_eq!(
            Backoff::from_config(&cfg).deadline(),
            Some(Duration::from_secs(120))
        );
        cfg.timeout_secs = 0;
        assert_eq!(Backoff::from_config(&cfg).deadline(), None);
    }

    #[test]
    fn shrinking_multiplier_is_clamped() {
        let b = Backoff::new(Duration::from_millis(500), Duration::from_millis(100), 0.1);
        assert_eq!(b.delay(1), Duration::from_millis(500));
        assert_eq!(b.delay(4), Duration::from_millis(500));
    }
}
