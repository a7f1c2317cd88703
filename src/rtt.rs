//! Adaptive retransmission-timeout estimation.
//!
//! Reliable delivery requires that unacknowledged packets are re-sent if no
//! ACK arrives within a bounded time.  [`RttEstimator`] sizes that bound
//! from observed round trips using a variant of Jacobson's algorithm
//! (RFC 6298):
//!
//! ```text
//! first sample:   EstRTT = R          DevRTT = R / 2
//! thereafter:     EstRTT = 7/8·EstRTT + 1/8·R
//!                 DevRTT = 3/4·DevRTT + 1/4·|R − EstRTT|
//! timeout = clamp(EstRTT + 4·DevRTT, 5 ms, 1000 ms)
//! ```
//!
//! The deviation update uses the freshly updated estimate.  Before the first
//! sample the timeout is a fixed initial value.  Unlike classic RFC 6298
//! there is no exponential back-off on timeout — the only adaptation is via
//! samples, and the clamp keeps the timer inside a fixed band.

use std::time::Duration;

/// Lower clamp on the adaptive timeout.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(5);

/// Upper clamp on the adaptive timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_millis(1000);

/// Timeout used before the first RTT sample arrives.
pub const INITIAL_TIMEOUT: Duration = Duration::from_millis(300);

/// Smoothed RTT state for one session.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// Smoothed RTT estimate; `None` until the first sample.
    estimated: Option<Duration>,
    /// Smoothed deviation of samples from the estimate.
    deviation: Duration,
    /// Current retransmission timeout.
    timeout: Duration,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RttEstimator {
    /// Construct an estimator with no samples and the initial timeout.
    pub fn new() -> Self {
        Self {
            estimated: None,
            deviation: Duration::ZERO,
            timeout: INITIAL_TIMEOUT,
        }
    }

    /// Record one round-trip sample and recompute the timeout.
    pub fn record_sample(&mut self, sample: Duration) {
        let estimated = match self.estimated {
            None => {
                self.deviation = sample / 2;
                sample
            }
            Some(prev) => {
                let next = prev * 7 / 8 + sample / 8;
                self.deviation = self.deviation * 3 / 4 + sample.abs_diff(next) / 4;
                next
            }
        };
        self.estimated = Some(estimated);
        self.timeout = (estimated + self.deviation * 4).clamp(MIN_TIMEOUT, MAX_TIMEOUT);
    }

    /// Current retransmission timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Smoothed RTT estimate; `None` before the first sample.
    pub fn estimated(&self) -> Option<Duration> {
        self.estimated
    }

    /// Smoothed RTT deviation.
    pub fn deviation(&self) -> Duration {
        self.deviation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_timeout_before_any_sample() {
        let est = RttEstimator::new();
        assert_eq!(est.timeout(), INITIAL_TIMEOUT);
        assert_eq!(est.estimated(), None);
    }

    #[test]
    fn first_sample_seeds_estimate_and_deviation() {
        let mut est = RttEstimator::new();
        est.record_sample(Duration::from_millis(100));
        assert_eq!(est.estimated(), Some(Duration::from_millis(100)));
        assert_eq!(est.deviation(), Duration::from_millis(50));
        // 100 + 4·50 = 300 ms, inside the clamp band.
        assert_eq!(est.timeout(), Duration::from_millis(300));
    }

    #[test]
    fn constant_samples_converge_to_sample_value() {
        let mut est = RttEstimator::new();
        let r = Duration::from_millis(100);
        for _ in 0..200 {
            est.record_sample(r);
        }
        // EstRTT stays at R exactly (100 ms is divisible by 8 in nanos),
        // DevRTT decays to zero, so the timeout converges to R.
        assert_eq!(est.estimated(), Some(r));
        assert_eq!(est.deviation(), Duration::ZERO);
        assert_eq!(est.timeout(), r);
    }

    #[test]
    fn timeout_clamped_to_minimum() {
        let mut est = RttEstimator::new();
        for _ in 0..200 {
            est.record_sample(Duration::from_micros(500));
        }
        assert_eq!(est.timeout(), MIN_TIMEOUT);
    }

    #[test]
    fn timeout_clamped_to_maximum() {
        let mut est = RttEstimator::new();
        est.record_sample(Duration::from_secs(3));
        assert_eq!(est.timeout(), MAX_TIMEOUT);
    }

    #[test]
    fn deviation_tracks_jitter() {
        let mut est = RttEstimator::new();
        est.record_sample(Duration::from_millis(100));
        est.record_sample(Duration::from_millis(200));
        assert!(est.deviation() > Duration::ZERO);
        assert!(est.timeout() > est.estimated().unwrap());
    }
}
