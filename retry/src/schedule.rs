//! Exponential delay schedule
//!
//! Turns a [`RetryPolicy`] into the bounded list of holding-queue delays and
//! answers whether a failed message may be retried again.
//!
//! Generation walks `initial * multiplier^i`, capping each entry at
//! `max_delay`, and stops one entry after the uncapped value first exceeds
//! the cap:
//!
//! ```text
//! initial=1s  multiplier=2  max=10s  max_attempts=6
//!
//! i        0    1    2    3    4(16s)
//! delay    1s   2s   4s   8s   10s      ← stop: 16s > 10s
//! ```
//!
//! Attempts past the end of the list reuse the last (capped) entry.

use crate::error::{Result, RetryError};
use std::time::Duration;

/// Retry policy
///
/// Immutable once validated; shared read-only by every recovery call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry (e.g., 1s)
    pub initial_delay: Duration,
    /// Multiplier for each further retry (e.g., 2.0 for doubling)
    pub multiplier: f64,
    /// Maximum delay between retries (e.g., 60s)
    pub max_delay: Duration,
    /// Retries allowed before dead-lettering (0 = dead-letter on first failure)
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Create and validate a policy
    pub fn new(
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
        max_attempts: u32,
    ) -> Result<Self> {
        let policy = Self {
            initial_delay,
            multiplier,
            max_delay,
            max_attempts,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Reject policies that cannot produce a positive delay
    ///
    /// Delays travel as whole milliseconds, so `initial_delay` must be at
    /// least 1ms. `multiplier` must be finite and positive. A `max_delay`
    /// below `initial_delay` is allowed and degrades to a single-entry
    /// schedule.
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay.as_millis() == 0 {
            return Err(RetryError::InvalidPolicy(format!(
                "initial_delay must be at least 1ms, got {:?}",
                self.initial_delay
            )));
        }
        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            return Err(RetryError::InvalidPolicy(format!(
                "multiplier must be a finite number > 0, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }
}

/// Compute the delay list in milliseconds
///
/// `prev` carries the previous *uncapped* value and is only used as the
/// stopping guard. When the loop body never runs (`max_attempts == 0`, or
/// `initial_ms > max_ms`) the result is `[initial_ms]`.
pub fn compute_delays(
    initial_ms: u64,
    multiplier: f64,
    max_ms: u64,
    max_attempts: u32,
) -> Vec<u64> {
    let mut delays = Vec::new();
    let mut prev = initial_ms;
    let mut i: u32 = 0;

    while i < max_attempts && prev <= max_ms {
        // f64 -> u64 truncates and saturates (inf -> u64::MAX)
        let raw = (initial_ms as f64 * multiplier.powf(f64::from(i))) as u64;
        delays.push(raw.min(max_ms));
        prev = raw;
        i += 1;
    }

    if delays.is_empty() {
        delays.push(initial_ms);
    }
    delays
}

/// Precomputed delay schedule for one [`RetryPolicy`]
///
/// # Example
///
/// ```
/// use holdback_retry::{DelaySchedule, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(
///     Duration::from_millis(1000),
///     3.0,
///     Duration::from_millis(10_000),
///     4,
/// )?;
/// let schedule = DelaySchedule::new(policy)?;
///
/// assert_eq!(schedule.delay_for(2), Duration::from_millis(9000));
/// assert_eq!(schedule.delay_for(99), Duration::from_millis(10_000));
/// assert!(schedule.can_retry(3));
/// assert!(!schedule.can_retry(4));
/// # Ok::<(), holdback_retry::RetryError>(())
/// ```
#[derive(Debug, Clone)]
pub struct DelaySchedule {
    policy: RetryPolicy,
    delays: Vec<Duration>,
}

impl DelaySchedule {
    /// Validate the policy and compute its schedule
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        policy.validate()?;
        let delays = compute_delays(
            millis(policy.initial_delay),
            policy.multiplier,
            millis(policy.max_delay),
            policy.max_attempts,
        )
        .into_iter()
        .map(Duration::from_millis)
        .collect();

        Ok(Self { policy, delays })
    }

    /// The policy this schedule was computed from
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The computed delays, never empty
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// True while `attempt < max_attempts`
    #[inline]
    pub fn can_retry(&self, attempt: u64) -> bool {
        attempt < u64::from(self.policy.max_attempts)
    }

    /// Delay for the given attempt, clamped to the last entry
    pub fn delay_for(&self, attempt: u64) -> Duration {
        let last = self.delays.len() - 1;
        let index = usize::try_from(attempt).unwrap_or(usize::MAX).min(last);
        self.delays[index]
    }

    /// Delay for the given attempt as whole milliseconds
    #[inline]
    pub fn delay_millis(&self, attempt: u64) -> u64 {
        millis(self.delay_for(attempt))
    }

    /// Sum of the delays a message waits through before it is dead-lettered
    ///
    /// This is the wall-clock bound on a message's retry lifecycle, excluding
    /// handler time and queueing.
    pub fn total_delay(&self) -> Duration {
        let attempts = u64::from(self.policy.max_attempts);
        let listed = self.delays.len() as u64;

        let head: Duration = self
            .delays
            .iter()
            .take(usize::try_from(attempts).unwrap_or(usize::MAX))
            .sum();
        let tail_count = attempts.saturating_sub(listed);
        let tail_ms = self.delay_millis(u64::MAX).saturating_mul(tail_count);

        head.saturating_add(Duration::from_millis(tail_ms))
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn schedule(initial: u64, multiplier: f64, max: u64, attempts: u32) -> DelaySchedule {
        DelaySchedule::new(RetryPolicy {
            initial_delay: Duration::from_millis(initial),
            multiplier,
            max_delay: Duration::from_millis(max),
            max_attempts: attempts,
        })
        .unwrap()
    }

    fn as_millis(s: &DelaySchedule) -> Vec<u64> {
        s.delays().iter().map(|d| d.as_millis() as u64).collect()
    }

    #[test]
    fn test_stops_one_past_the_cap() {
        let s = schedule(1000, 2.0, 10_000, 6);
        assert_eq!(as_millis(&s), vec![1000, 2000, 4000, 8000, 10_000]);
    }

    #[test]
    fn test_triple_multiplier_schedule() {
        let s = schedule(1000, 3.0, 10_000, 4);
        assert_eq!(as_millis(&s), vec![1000, 3000, 9000, 10_000]);

        let expected = [1000, 3000, 9000, 10_000];
        for (attempt, ms) in expected.iter().enumerate() {
            assert_eq!(s.delay_for(attempt as u64), Duration::from_millis(*ms));
        }
    }

    #[test]
    fn test_zero_attempts_falls_back_to_initial() {
        let s = schedule(1500, 2.0, 10_000, 0);
        assert_eq!(as_millis(&s), vec![1500]);
        assert_eq!(s.delay_for(0), Duration::from_millis(1500));
        assert!(!s.can_retry(0));
    }

    #[test]
    fn test_max_below_initial_falls_back_to_initial() {
        let s = schedule(5000, 2.0, 1000, 3);
        assert_eq!(as_millis(&s), vec![5000]);
    }

    #[test]
    fn test_attempt_limit_stops_before_cap() {
        let s = schedule(100, 2.0, 1_000_000, 3);
        assert_eq!(as_millis(&s), vec![100, 200, 400]);
    }

    #[test]
    fn test_cap_hit_exactly_continues() {
        // 1000 * 2^3 = 8000 == cap, guard is `<=` so generation continues
        let s = schedule(1000, 2.0, 8000, 10);
        assert_eq!(as_millis(&s), vec![1000, 2000, 4000, 8000, 8000]);
    }

    #[test]
    fn test_fractional_values_truncate() {
        let s = schedule(333, 1.5, 100_000, 4);
        // 333, 499.5, 749.25, 1123.875
        assert_eq!(as_millis(&s), vec![333, 499, 749, 1123]);
    }

    #[test]
    fn test_unit_multiplier_is_flat() {
        let s = schedule(250, 1.0, 1000, 5);
        assert_eq!(as_millis(&s), vec![250; 5]);
    }

    #[test]
    fn test_huge_multiplier_saturates_to_cap() {
        let s = schedule(1, 1e300, 60_000, 10);
        assert_eq!(as_millis(&s), vec![1, 60_000]);
    }

    #[test]
    fn test_delay_for_clamps_to_last() {
        let s = schedule(1000, 2.0, 10_000, 6);
        let last = s.delays().len() as u64 - 1;
        for attempt in last..last + 20 {
            assert_eq!(s.delay_for(attempt), s.delay_for(last));
        }
        assert_eq!(s.delay_for(u64::MAX), Duration::from_millis(10_000));
    }

    #[test]
    fn test_can_retry_is_strictly_below_max() {
        let s = schedule(1000, 2.0, 10_000, 3);
        for n in 0..10u64 {
            assert_eq!(s.can_retry(n), n < 3, "attempt {n}");
        }
    }

    #[test]
    fn test_schedule_invariants_over_policy_grid() {
        let initials = [1u64, 10, 250, 1000, 7000];
        let multipliers = [1.0, 1.1, 1.5, 2.0, 3.0, 10.0];
        let maxes = [1u64, 100, 5000, 60_000];

        for &initial in &initials {
            for &multiplier in &multipliers {
                for &max in &maxes {
                    for attempts in 0..12u32 {
                        let s = schedule(initial, multiplier, max, attempts);
                        let d = as_millis(&s);

                        assert!(!d.is_empty());
                        if attempts > 0 {
                            assert!(d.len() <= attempts as usize);
                        }
                        assert!(d.windows(2).all(|w| w[0] <= w[1]), "{d:?}");
                        if initial <= max {
                            assert!(d.iter().all(|&v| v <= max), "{d:?} > {max}");
                        }
                        // never two trailing entries at the cap unless the cap was hit exactly
                        if d.len() >= 2 && d[d.len() - 1] == max && d[d.len() - 2] == max {
                            let exact = (0..d.len() as u32).any(|i| {
                                (initial as f64 * multiplier.powf(f64::from(i))) as u64 == max
                            });
                            assert!(exact, "{d:?}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_total_delay_sums_over_attempts() {
        // 1000 + 2000 + 4000 + 8000 + 10000 + 10000 (6th attempt reuses the cap)
        let s = schedule(1000, 2.0, 10_000, 6);
        assert_eq!(s.total_delay(), Duration::from_millis(35_000));

        let none = schedule(1000, 2.0, 10_000, 0);
        assert_eq!(none.total_delay(), Duration::ZERO);
    }

    #[test]
    fn test_policy_rejects_zero_initial_delay() {
        let err = RetryPolicy::new(Duration::ZERO, 2.0, Duration::from_secs(1), 3).unwrap_err();
        assert!(matches!(err, RetryError::InvalidPolicy(_)));

        // sub-millisecond delays cannot be expressed as a broker TTL
        let err = RetryPolicy::new(Duration::from_micros(500), 2.0, Duration::from_secs(1), 3)
            .unwrap_err();
        assert!(matches!(err, RetryError::InvalidPolicy(_)));
    }

    #[test]
    fn test_policy_rejects_bad_multiplier() {
        for multiplier in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = RetryPolicy::new(
                Duration::from_secs(1),
                multiplier,
                Duration::from_secs(10),
                3,
            );
            assert!(
                matches!(result, Err(RetryError::InvalidPolicy(_))),
                "multiplier {multiplier}"
            );
        }
    }

    #[test]
    fn test_schedule_new_validates() {
        let policy = RetryPolicy {
            multiplier: -2.0,
            ..Default::default()
        };
        assert!(DelaySchedule::new(policy).is_err());
    }

    #[test]
    fn test_default_policy() {
        let s = DelaySchedule::new(RetryPolicy::default()).unwrap();
        assert_eq!(as_millis(&s), vec![1000, 2000, 4000]);
        assert_eq!(s.policy().max_attempts, 3);
        assert_eq!(s.delay_millis(7), 4000);
    }
}
