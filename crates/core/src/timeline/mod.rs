use std::time::{Duration, Instant};

/// Converts a tuning value in seconds into a [`Duration`]. Negative, NaN and
/// overflowing inputs collapse to zero instead of panicking.
pub fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

/// A point in time after which something should happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(now: Instant, secs: f64) -> Self {
        Self {
            at: now + seconds(secs),
        }
    }

    pub fn reset(&mut self, now: Instant, secs: f64) {
        *self = Self::after(now, secs);
    }

    /// Expired once `now` reaches the deadline, inclusive.
    pub fn expired(&self, now: Instant) -> bool {
        now >= self.at
    }
}
