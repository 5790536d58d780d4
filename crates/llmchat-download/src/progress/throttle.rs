//! Progress throttling.
//!
//! Rate-limits progress fractions so a fast connection does not flood the
//! lifecycle manager (and the UI behind it) with one event per chunk.

use std::time::{Duration, Instant};

/// Rate-limiter for progress fractions.
///
/// A fraction is reported only if it advanced past the last reported one and
/// the configured interval has elapsed.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    last_fraction: f64,
    min_interval: Duration,
}

impl ProgressThrottle {
    /// Create a new throttle with the specified minimum interval.
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            last_emit: None,
            last_fraction: 0.0,
            min_interval,
        }
    }

    /// Whether `fraction` should be reported now.
    pub fn should_report(&mut self, fraction: f64) -> bool {
        if self.last_emit.is_some() && fraction <= self.last_fraction {
            return false;
        }
        let now = Instant::now();
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_emit = Some(now);
                self.last_fraction = fraction;
                true
            }
        }
    }
}
