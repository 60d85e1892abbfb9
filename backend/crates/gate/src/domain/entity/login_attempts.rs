//! Login Attempts Entity
//!
//! Attempt counter and phase of one sector's sign-in form for one client.
//! Pure state machine; the owning `LoginGate` supplies the timer ticks and
//! the identity provider round trip.
//!
//! ```text
//!  idle ──submit──▶ submitting ──ok──────────────▶ idle (attempts = 0)
//!                        │
//!                        └──fail──▶ idle (attempts + 1)
//!                                   or locked(n) once attempts hit the limit
//!  locked(n) ──tick──▶ locked(n-1) … locked(1) ──tick──▶ idle (attempts = 0)
//! ```

use platform::lockout::LockoutPolicy;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Idle,
    Submitting,
    Locked { remaining_seconds: u32 },
}

/// Why a submit was refused without contacting the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    Locked { remaining_seconds: u32 },
    InFlight,
}

/// What a recorded failure did to the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retry { remaining_attempts: u32 },
    LockedOut { remaining_seconds: u32 },
}

/// Externally visible counter state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptStatus {
    pub attempts: u32,
    pub locked: bool,
    pub remaining_seconds: u32,
    pub remaining_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct LoginAttempts {
    attempts: u32,
    phase: GatePhase,
}

impl Default for LoginAttempts {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginAttempts {
    pub fn new() -> Self {
        Self {
            attempts: 0,
            phase: GatePhase::Idle,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn phase(&self) -> GatePhase {
        self.phase
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.phase, GatePhase::Locked { .. })
    }

    /// Move to `submitting`. Only valid from `idle`.
    pub fn begin_submit(&mut self) -> Result<(), Refusal> {
        match self.phase {
            GatePhase::Idle => {
                self.phase = GatePhase::Submitting;
                Ok(())
            }
            GatePhase::Submitting => Err(Refusal::InFlight),
            GatePhase::Locked { remaining_seconds } => Err(Refusal::Locked { remaining_seconds }),
        }
    }

    /// The in-flight submit went away without an answer. Nothing is counted.
    pub fn abandon_submit(&mut self) {
        if self.phase == GatePhase::Submitting {
            self.phase = GatePhase::Idle;
        }
    }

    pub fn record_success(&mut self) {
        self.attempts = 0;
        self.phase = GatePhase::Idle;
    }

    pub fn record_failure(&mut self, policy: &LockoutPolicy) -> FailureOutcome {
        self.attempts = self.attempts.saturating_add(1);

        if policy.is_exhausted(self.attempts) {
            let remaining_seconds = policy.lockout_secs.max(1);
            self.phase = GatePhase::Locked { remaining_seconds };
            FailureOutcome::LockedOut { remaining_seconds }
        } else {
            self.phase = GatePhase::Idle;
            FailureOutcome::Retry {
                remaining_attempts: policy.remaining_attempts(self.attempts),
            }
        }
    }

    /// One lockout tick. Returns the seconds left, or `None` when not locked.
    /// Reaching zero unlocks the gate and forgives all earlier failures.
    pub fn tick(&mut self) -> Option<u32> {
        let GatePhase::Locked { remaining_seconds } = self.phase else {
            return None;
        };

        let remaining_seconds = remaining_seconds.saturating_sub(1);
        if remaining_seconds == 0 {
            self.attempts = 0;
            self.phase = GatePhase::Idle;
        } else {
            self.phase = GatePhase::Locked { remaining_seconds };
        }
        Some(remaining_seconds)
    }

    pub fn status(&self, policy: &LockoutPolicy) -> AttemptStatus {
        let remaining_seconds = match self.phase {
            GatePhase::Locked { remaining_seconds } => remaining_seconds,
            _ => 0,
        };
        AttemptStatus {
            attempts: self.attempts,
            locked: self.is_locked(),
            remaining_seconds,
            remaining_attempts: policy.remaining_attempts(self.attempts),
        }
    }
}
