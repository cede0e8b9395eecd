//! Rate Limiter & Backoff (C2, spec.md §4.2).
//!
//! A token bucket that guards calls to the upstream (`gh`/GitHub) service,
//! plus an independent exponential-with-deterministic-jitter backoff used
//! between retries. Both are owned by the server as explicit structs rather
//! than process-wide globals (spec.md §9's design note), guarded by a
//! `tokio::sync::Mutex` where shared across tasks.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Token-bucket rate limiter state (spec.md §3 "Rate Limiter State").
#[derive(Debug, Clone)]
pub struct RateLimiter {
    capacity: u32,
    remaining: u32,
    reset_at: Instant,
    refill_interval: Duration,
    warn_threshold: u32,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_interval: Duration, warn_threshold: u32) -> Self {
        Self {
            capacity,
            remaining: capacity,
            reset_at: Instant::now() + refill_interval,
            refill_interval,
            warn_threshold,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Attempt to consume one token at instant `now`.
    ///
    /// Refills to full capacity (not a leaky trickle) once `now >= reset_at`,
    /// advancing `reset_at` by one `refill_interval`; otherwise decrements
    /// `remaining` if positive.
    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        if now >= self.reset_at {
            self.remaining = self.capacity;
            self.reset_at = now + self.refill_interval;
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }

    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// True once `remaining` has dropped into `(0, warn_threshold]`.
    pub fn should_warn(&self) -> bool {
        self.remaining > 0 && self.remaining <= self.warn_threshold
    }

    /// Override state from an upstream response's rate-limit headers.
    ///
    /// `reset_epoch_seconds` is converted to an `Instant` relative to now;
    /// note the unit conversion from seconds (header convention) to the
    /// millisecond-precision `Duration` used internally.
    pub fn update_from_headers(&mut self, remaining: u32, reset_epoch_seconds: u64) {
        self.remaining = remaining.min(self.capacity);
        let now_epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i128;
        let reset_epoch_ms = reset_epoch_seconds as i128 * 1000;
        let delta_ms = (reset_epoch_ms - now_epoch_ms).max(0) as u64;
        self.reset_at = Instant::now() + Duration::from_millis(delta_ms);
    }
}

/// Exponential-with-deterministic-jitter backoff (spec.md §3 / §4.2).
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            attempt: 0,
            base,
            max,
        }
    }

    /// `min(base * 2^min(attempt,5), max)`, with deterministic jitter
    /// `(capped * (attempt*7 + 3)) mod (capped + 1)` applied on top, then
    /// increments the attempt counter.
    ///
    /// The jitter formula always yields a value in `[0, capped]`, which is
    /// what keeps the testable bound `nextDelay <= max` true unconditionally.
    pub fn next_delay(&mut self) -> Duration {
        let shift = self.attempt.min(5);
        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let capped_ms = base_ms.saturating_mul(1u64 << shift).min(max_ms);

        let multiplier = (self.attempt as u64).saturating_mul(7).saturating_add(3);
        let jitter_ms = capped_ms.saturating_mul(multiplier) % (capped_ms + 1);

        self.attempt += 1;
        Duration::from_millis(jitter_ms)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= 6
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_acquire_decrements_until_exhausted() {
        let mut rl = RateLimiter::new(3, Duration::from_secs(60), 1);
        let now = Instant::now();
        assert!(rl.try_acquire_at(now));
        assert_eq!(rl.remaining(), 2);
        assert!(rl.try_acquire_at(now));
        assert!(rl.try_acquire_at(now));
        assert_eq!(rl.remaining(), 0);
        assert!(!rl.try_acquire_at(now));
    }

    #[test]
    fn refills_fully_after_reset_instant() {
        let mut rl = RateLimiter::new(3, Duration::from_millis(10), 1);
        let now = Instant::now();
        rl.try_acquire_at(now);
        rl.try_acquire_at(now);
        rl.try_acquire_at(now);
        assert_eq!(rl.remaining(), 0);

        let later = now + Duration::from_millis(11);
        assert!(rl.try_acquire_at(later));
        assert_eq!(rl.remaining(), 2);
    }

    #[test]
    fn should_warn_only_in_low_nonzero_band() {
        let mut rl = RateLimiter::new(5, Duration::from_secs(60), 2);
        let now = Instant::now();
        assert!(!rl.should_warn());
        for _ in 0..3 {
            rl.try_acquire_at(now);
        }
        // remaining == 2, within (0, 2]
        assert!(rl.should_warn());
        rl.try_acquire_at(now);
        rl.try_acquire_at(now);
        // remaining == 0: not "warn", it's exhausted
        assert!(!rl.should_warn());
    }

    #[test]
    fn update_from_headers_overrides_state() {
        let mut rl = RateLimiter::new(100, Duration::from_secs(3600), 10);
        let reset_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 30;
        rl.update_from_headers(7, reset_epoch);
        assert_eq!(rl.remaining(), 7);
        assert!(rl.reset_at > Instant::now());
    }

    #[test]
    fn backoff_never_exceeds_max() {
        let mut b = Backoff::new(Duration::from_millis(100), Duration::from_millis(500));
        for _ in 0..20 {
            let d = b.next_delay();
            assert!(d <= Duration::from_millis(500));
        }
    }

    #[test]
    fn backoff_first_delay_after_reset_is_at_most_base() {
        let mut b = Backoff::new(Duration::from_millis(200), Duration::from_millis(10_000));
        b.next_delay();
        b.next_delay();
        b.reset();
        let d = b.next_delay();
        assert!(d <= Duration::from_millis(200));
    }

    #[test]
    fn backoff_exhausted_at_six_attempts() {
        let mut b = Backoff::new(Duration::from_millis(10), Duration::from_millis(1000));
        assert!(!b.exhausted());
        for _ in 0..6 {
            b.next_delay();
        }
        assert!(b.exhausted());
    }

    #[test]
    fn backoff_is_deterministic() {
        let mut a = Backoff::new(Duration::from_millis(50), Duration::from_millis(800));
        let mut b = Backoff::new(Duration::from_millis(50), Duration::from_millis(800));
        for _ in 0..6 {
            assert_eq!(a.next_delay(), b.next_delay());
        }
    }
}
