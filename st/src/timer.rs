//! Countdown state
//!
//! Plain data with no clock of its own: the runner feeds it fixed steps. Exactly
//! one task owns a `Countdown`; restart requests from other tasks reach it over
//! a channel.

use std::time::Duration;

use tracing::debug;

/// Result of advancing the countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running { remaining: Duration },
    Expired,
}

/// Elapsed time toward a fixed deadline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    duration: Duration,
    elapsed: Duration,
}

impl Countdown {
    pub fn new(duration: Duration) -> Self {
        debug!(?duration, "Countdown::new: called");
        Self {
            duration,
            elapsed: Duration::ZERO,
        }
    }

    /// Advance by `step`, saturating at the deadline
    pub fn tick(&mut self, step: Duration) -> TickOutcome {
        self.elapsed = (self.elapsed + step).min(self.duration);
        if self.is_expired() {
            TickOutcome::Expired
        } else {
            TickOutcome::Running {
                remaining: self.remaining(),
            }
        }
    }

    /// Back to zero elapsed time; restarting a fresh countdown is a no-op
    pub fn restart(&mut self) {
        debug!(elapsed = ?self.elapsed, "Countdown::restart: called");
        self.elapsed = Duration::ZERO;
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.elapsed)
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Fraction of the duration already used, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    /// Human-readable remaining time
    pub fn status_text(&self) -> String {
        let remaining = self.remaining().as_secs();
        if remaining < 60 {
            format!("Shutdown Timer - {} sec remaining", remaining)
        } else {
            format!("Shutdown Timer - {} min remaining", remaining / 60)
        }
    }
}
