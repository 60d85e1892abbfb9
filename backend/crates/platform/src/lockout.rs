//! Lockout Infrastructure
//!
//! Attempt-limit policy plus [`Countdown`], a cancellable once-per-tick
//! timer. The countdown runs on tokio's clock, so tests can drive it with a
//! paused runtime instead of waiting in real time.

use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

/// Lockout configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failures that trigger a lockout
    pub max_attempts: u32,
    /// Length of a lockout, in ticks
    pub lockout_secs: u32,
    /// Duration of one tick
    pub tick: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_secs: 60,
            tick: Duration::from_secs(1),
        }
    }
}

impl LockoutPolicy {
    pub fn new(max_attempts: u32, lockout_secs: u32) -> Self {
        Self {
            max_attempts,
            lockout_secs,
            ..Default::default()
        }
    }

    /// Whether `attempts` failures exhaust the allowance
    #[inline]
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    #[inline]
    pub fn remaining_attempts(&self, attempts: u32) -> u32 {
        self.max_attempts.saturating_sub(attempts)
    }

    pub fn lockout_duration(&self) -> Duration {
        self.tick * self.lockout_secs
    }
}

/// A running countdown from `n` to 0, one step per period.
///
/// `on_tick` receives the value after each decrement and may return
/// `ControlFlow::Break` to stop early. Dropping or cancelling the countdown
/// aborts the task; no tick is delivered after that.
#[derive(Debug)]
pub struct Countdown {
    handle: JoinHandle<()>,
}

impl Countdown {
    /// Spawn a countdown on the current tokio runtime.
    pub fn start<F>(from: u32, period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut(u32) -> ControlFlow<()> + Send + 'static,
    {
        let first = Instant::now() + period;

        let handle = tokio::spawn(async move {
            let mut interval = interval_at(first, period);
            let mut remaining = from;

            while remaining > 0 {
                interval.tick().await;
                remaining -= 1;
                if on_tick(remaining).is_break() {
                    tracing::trace!(remaining, "Countdown stopped by its owner");
                    return;
                }
            }
        });

        Self { handle }
    }

    /// Abort the countdown. Idempotent.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
