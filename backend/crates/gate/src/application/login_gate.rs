//! Login Gate
//!
//! Sector sign-in form logic for one client: forwards credentials to the
//! identity provider, counts failures, and locks the form for a fixed
//! period once the limit is reached. Failures also count against the
//! account in a table shared by every client.

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use platform::lockout::{Countdown, LockoutPolicy};

use crate::application::account_lockout::AccountLockouts;
use crate::domain::entity::{AttemptStatus, FailureOutcome, Identity, LoginAttempts, Refusal};
use crate::domain::provider::{IdentityError, IdentityProvider};
use crate::domain::value_object::{Email, Sector};
use crate::error::{GateError, GateResult};

/// Successful sector sign-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedIn {
    pub identity: Identity,
    /// The sector's admin area
    pub redirect: &'static str,
}

struct GateCell {
    attempts: LoginAttempts,
    /// Bumped whenever a countdown starts or the gate shuts down; a tick
    /// from an older countdown is ignored.
    epoch: u64,
    countdown: Option<Countdown>,
}

pub struct LoginGate<P> {
    sector: Sector,
    provider: Arc<P>,
    policy: LockoutPolicy,
    accounts: Arc<AccountLockouts>,
    cell: Arc<Mutex<GateCell>>,
}

/// Puts the gate back to idle if a submit future is dropped mid-flight
struct InFlight<'a> {
    cell: &'a Mutex<GateCell>,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cell.lock().attempts.abandon_submit();
            tracing::debug!("Sign-in abandoned before the provider answered");
        }
    }
}

impl<P> LoginGate<P> {
    pub fn sector(&self) -> Sector {
        self.sector
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    pub fn status(&self) -> AttemptStatus {
        self.cell.lock().attempts.status(&self.policy)
    }

    pub fn is_locked(&self) -> bool {
        self.cell.lock().attempts.is_locked()
    }

    /// Cancel a running lockout countdown. The gate stays in whatever state
    /// it is in; used when the owning client goes away.
    pub fn shutdown(&self) {
        let mut cell = self.cell.lock();
        cell.epoch += 1;
        if let Some(countdown) = cell.countdown.take() {
            countdown.cancel();
        }
    }
}

impl<P> LoginGate<P>
where
    P: IdentityProvider + Send + Sync + 'static,
{
    /// A gate with its own account table
    pub fn new(sector: Sector, provider: Arc<P>, policy: LockoutPolicy) -> Self {
        Self::with_account_lockouts(sector, provider, Arc::new(AccountLockouts::new(policy, 1024)))
    }

    pub fn with_account_lockouts(sector: Sector, provider: Arc<P>, accounts: Arc<AccountLockouts>) -> Self {
        Self {
            sector,
            provider,
            policy: *accounts.policy(),
            accounts,
            cell: Arc::new(Mutex::new(GateCell {
                attempts: LoginAttempts::new(),
                epoch: 0,
                countdown: None,
            })),
        }
    }

    /// Submit credentials for this sector.
    ///
    /// Refused without contacting the provider while this gate or the
    /// account is locked, or while another submit is in flight. A malformed
    /// email is rejected before anything is counted.
    pub async fn submit(&self, email: &str, password: &str) -> GateResult<SignedIn> {
        let email = Email::new(email).map_err(|e| GateError::InvalidEmail(e.message().to_string()))?;

        self.cell
            .lock()
            .attempts
            .begin_submit()
            .map_err(|refusal| match refusal {
                Refusal::Locked { remaining_seconds } => GateError::Locked { remaining_seconds },
                Refusal::InFlight => GateError::SubmitInFlight,
            })?;

        if let Some(remaining_seconds) = self.accounts.locked_for(self.sector, &email) {
            self.cell.lock().attempts.abandon_submit();
            tracing::warn!(sector = %self.sector, remaining_seconds, "Sign-in refused, account locked");
            return Err(GateError::Locked { remaining_seconds });
        }

        let mut in_flight = InFlight {
            cell: &self.cell,
            armed: true,
        };
        let result = self.provider.sign_in(&email, password).await;
        in_flight.disarm();

        if result.is_ok() {
            self.accounts.record_success(self.sector, &email);
        }
        let account = result
            .is_err()
            .then(|| self.accounts.record_failure(self.sector, &email));

        let mut cell = self.cell.lock();
        match result {
            Ok(identity) => {
                cell.attempts.record_success();
                tracing::info!(sector = %self.sector, uid = %identity.uid, "Sector sign-in succeeded");
                Ok(SignedIn {
                    identity,
                    redirect: self.sector.route(),
                })
            }
            Err(err) => {
                let outcome = cell.attempts.record_failure(&self.policy);
                let account_remaining = match account {
                    Some(FailureOutcome::Retry { remaining_attempts }) => remaining_attempts,
                    _ => 0,
                };
                let remaining_attempts = self
                    .policy
                    .remaining_attempts(cell.attempts.attempts())
                    .min(account_remaining);

                if let FailureOutcome::LockedOut { remaining_seconds } = outcome {
                    tracing::warn!(
                        sector = %self.sector,
                        remaining_seconds,
                        "Sign-in locked after repeated failures"
                    );
                    self.start_countdown(&mut cell, remaining_seconds);
                }

                Err(match err {
                    IdentityError::InvalidCredentials => GateError::InvalidCredentials { remaining_attempts },
                    IdentityError::Network(message) | IdentityError::SignOut(message) => {
                        GateError::Network {
                            message,
                            remaining_attempts,
                        }
                    }
                })
            }
        }
    }

    fn start_countdown(&self, cell: &mut GateCell, seconds: u32) {
        cell.epoch += 1;
        let epoch = cell.epoch;
        let sector = self.sector;
        let weak: Weak<Mutex<GateCell>> = Arc::downgrade(&self.cell);

        let countdown = Countdown::start(seconds, self.policy.tick, move |_| {
            let Some(cell) = weak.upgrade() else {
                return ControlFlow::Break(());
            };
            let mut cell = cell.lock();
            if cell.epoch != epoch {
                return ControlFlow::Break(());
            }
            match cell.attempts.tick() {
                Some(0) => {
                    tracing::info!(sector = %sector, "Sign-in lockout expired");
                    ControlFlow::Break(())
                }
                Some(_) => ControlFlow::Continue(()),
                None => ControlFlow::Break(()),
            }
        });

        // Replacing drops (and aborts) any previous countdown
        cell.countdown = Some(countdown);
    }
}

impl<P> Drop for LoginGate<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::infra::memory::{InMemoryIdentityDirectory, InMemoryIdentityProvider};

    const EMAIL: &str = "alms@example.org";
    const PASSWORD: &str = "correct horse";

    fn gate() -> (Arc<InMemoryIdentityProvider>, LoginGate<InMemoryIdentityProvider>) {
        let directory = InMemoryIdentityDirectory::new();
        directory.add_account(EMAIL, PASSWORD).unwrap();
        let provider = Arc::new(InMemoryIdentityProvider::new(Arc::new(directory)));
        let gate = LoginGate::new(Sector::Charity, provider.clone(), LockoutPolicy::default());
        (provider, gate)
    }

    async fn fail(gate: &LoginGate<InMemoryIdentityProvider>) -> GateError {
        gate.submit(EMAIL, "wrong").await.unwrap_err()
    }

    /// Let the countdown task observe the advanced clock
    async fn advance(secs: u64) {
        for _ in 0..secs {
            tokio::time::advance(Duration::from_secs(1)).await;
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_redirects_to_sector_area() {
        let (_, gate) = gate();
        let signed_in = gate.submit(EMAIL, PASSWORD).await.unwrap();
        assert_eq!(signed_in.redirect, "/admin/charity");
        assert_eq!(signed_in.identity.email(), Some(EMAIL));
        assert_eq!(gate.status().attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_count_down_remaining_attempts() {
        let (_, gate) = gate();
        for expected in [4, 3, 2, 1] {
            let err = fail(&gate).await;
            assert!(matches!(
                err,
                GateError::InvalidCredentials { remaining_attempts } if remaining_attempts == expected
            ));
        }
        assert_eq!(gate.status().attempts, 4);
        assert!(!gate.is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifth_failure_locks_for_a_minute() {
        let (provider, gate) = gate();
        for _ in 0..5 {
            fail(&gate).await;
        }

        let status = gate.status();
        assert!(status.locked);
        assert_eq!(status.remaining_seconds, 60);
        assert_eq!(status.remaining_attempts, 0);

        // Refused without reaching the provider, even with the right password
        let calls = provider.sign_in_calls();
        let err = gate.submit(EMAIL, PASSWORD).await.unwrap_err();
        assert!(matches!(err, GateError::Locked { remaining_seconds: 60 }));
        assert_eq!(provider.sign_in_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lockout_counts_down_and_resets() {
        let (_, gate) = gate();
        for _ in 0..5 {
            fail(&gate).await;
        }

        advance(1).await;
        assert_eq!(gate.status().remaining_seconds, 59);

        advance(58).await;
        let status = gate.status();
        assert!(status.locked);
        assert_eq!(status.remaining_seconds, 1);

        advance(1).await;
        let status = gate.status();
        assert!(!status.locked);
        assert_eq!(status.attempts, 0);
        assert_eq!(status.remaining_attempts, 5);

        gate.submit(EMAIL, PASSWORD).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlock_grants_a_full_allowance() {
        let (_, gate) = gate();
        for _ in 0..5 {
            fail(&gate).await;
        }
        advance(60).await;
        assert!(!gate.is_locked());

        for expected in [4, 3, 2, 1] {
            let err = fail(&gate).await;
            assert!(matches!(
                err,
                GateError::InvalidCredentials { remaining_attempts } if remaining_attempts == expected
            ));
            assert!(!gate.is_locked());
        }

        let err = fail(&gate).await;
        assert!(matches!(err, GateError::InvalidCredentials { remaining_attempts: 0 }));
        let status = gate.status();
        assert!(status.locked);
        assert_eq!(status.remaining_seconds, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_lock_is_shared_between_gates() {
        let directory = InMemoryIdentityDirectory::new();
        directory.add_account(EMAIL, PASSWORD).unwrap();
        let directory = Arc::new(directory);
        let accounts = Arc::new(AccountLockouts::new(LockoutPolicy::default(), 16));
        let first_provider = Arc::new(InMemoryIdentityProvider::new(directory.clone()));
        let second_provider = Arc::new(InMemoryIdentityProvider::new(directory));
        let first = LoginGate::with_account_lockouts(Sector::Charity, first_provider, accounts.clone());
        let second = LoginGate::with_account_lockouts(Sector::Charity, second_provider.clone(), accounts);

        for _ in 0..3 {
            fail(&first).await;
        }
        // A fresh gate reports what the account has left
        let err = fail(&second).await;
        assert!(matches!(err, GateError::InvalidCredentials { remaining_attempts: 1 }));
        fail(&second).await;
        assert!(!second.is_locked());

        let calls = second_provider.sign_in_calls();
        let err = second.submit(EMAIL, PASSWORD).await.unwrap_err();
        assert!(matches!(err, GateError::Locked { remaining_seconds: 60 }));
        assert_eq!(second_provider.sign_in_calls(), calls);
        assert_eq!(second.status().attempts, 2);

        // The refusal leaves the gate idle for other accounts
        assert!(second.submit("other@example.org", PASSWORD).await.is_err());
        assert_eq!(second.status().attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_counter() {
        let (_, gate) = gate();
        for _ in 0..3 {
            fail(&gate).await;
        }
        gate.submit(EMAIL, PASSWORD).await.unwrap();
        assert_eq!(gate.status().attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_counts() {
        let (provider, gate) = gate();
        provider.set_network_down(true);
        let err = gate.submit(EMAIL, PASSWORD).await.unwrap_err();
        assert!(matches!(err, GateError::Network { remaining_attempts: 4, .. }));
        assert_eq!(gate.status().attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_email_is_not_counted() {
        let (provider, gate) = gate();
        let err = gate.submit("not-an-email", PASSWORD).await.unwrap_err();
        assert!(matches!(err, GateError::InvalidEmail(_)));
        assert_eq!(gate.status().attempts, 0);
        assert_eq!(provider.sign_in_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_submit_while_in_flight_is_refused() {
        let (provider, gate) = gate();
        provider.set_latency(Some(Duration::from_secs(2)));

        let (first, second) = tokio::join!(gate.submit(EMAIL, PASSWORD), async {
            tokio::task::yield_now().await;
            gate.submit(EMAIL, PASSWORD).await
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(GateError::SubmitInFlight)));
        assert_eq!(provider.sign_in_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_submit_returns_to_idle() {
        let (provider, gate) = gate();
        provider.set_latency(Some(Duration::from_secs(10)));

        let result = tokio::time::timeout(Duration::from_secs(1), gate.submit(EMAIL, PASSWORD)).await;
        assert!(result.is_err());

        let status = gate.status();
        assert_eq!(status.attempts, 0);
        assert!(!status.locked);

        provider.set_latency(None);
        gate.submit(EMAIL, PASSWORD).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_freezes_lockout() {
        let (_, gate) = gate();
        for _ in 0..5 {
            fail(&gate).await;
        }
        gate.shutdown();

        advance(5).await;
        assert_eq!(gate.status().remaining_seconds, 60);
    }
}
