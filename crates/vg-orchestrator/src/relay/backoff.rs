//! Reconnection delay
//!
//! The relay uses a fixed delay; the multiplier and jitter let the same type
//! express a growing delay when configured.

use std::time::Duration;

/// Delay schedule between reconnection attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    current: Duration,
    max: Duration,
    multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    jitter: f64,
}

impl Backoff {
    /// Same delay every time
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay, 1.0, 0.0)
    }

    /// Growing delay capped at `max`
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            initial,
            current: initial,
            max,
            multiplier: multiplier.max(1.0),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Get the next delay and advance the schedule
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;

        let next = Duration::from_secs_f64(self.current.as_secs_f64() * self.multiplier);
        self.current = std::cmp::min(next, self.max);

        if self.jitter == 0.0 {
            return delay;
        }
        let jitter_amount = delay.as_secs_f64() * self.jitter * rand::random::<f64>();
        delay + Duration::from_secs_f64(jitter_amount)
    }

    /// Return to the initial delay after a successful connection
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
