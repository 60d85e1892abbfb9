//! Account Lockout
//!
//! Server-wide failure counter per sector and email. A client's own gate
//! forgets its count when the browser drops the cookie; this table does not,
//! so the attempt limit holds across clients.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use platform::lockout::LockoutPolicy;
use tokio::time::Instant;

use crate::domain::entity::FailureOutcome;
use crate::domain::value_object::{Email, Sector};

#[derive(Debug, Clone, Copy)]
struct Entry {
    failures: u32,
    last_failure: Instant,
    locked_until: Option<Instant>,
}

impl Entry {
    fn is_locked(&self, now: Instant) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// A lockout that ran out forgives the failures before it
    fn is_spent(&self, now: Instant) -> bool {
        self.locked_until.is_some_and(|until| now >= until)
    }
}

type AccountKey = (Sector, Email);

pub struct AccountLockouts {
    policy: LockoutPolicy,
    capacity: usize,
    entries: Mutex<HashMap<AccountKey, Entry>>,
}

impl AccountLockouts {
    pub fn new(policy: LockoutPolicy, capacity: usize) -> Self {
        Self {
            policy,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Seconds left on the account's lockout, if it is locked
    pub fn locked_for(&self, sector: Sector, email: &Email) -> Option<u32> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let key = (sector, email.clone());
        let entry = entries.get(&key)?;

        if entry.is_spent(now) {
            entries.remove(&key);
            return None;
        }
        let until = entry.locked_until?;
        Some(whole_seconds(until - now))
    }

    pub fn remaining_attempts(&self, sector: Sector, email: &Email) -> u32 {
        let now = Instant::now();
        let failures = self
            .entries
            .lock()
            .get(&(sector, email.clone()))
            .filter(|entry| !entry.is_spent(now))
            .map_or(0, |entry| entry.failures);
        self.policy.remaining_attempts(failures)
    }

    pub fn record_failure(&self, sector: Sector, email: &Email) -> FailureOutcome {
        let now = Instant::now();
        let key = (sector, email.clone());
        let mut entries = self.entries.lock();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            make_room(&mut entries, self.capacity, now);
        }

        let entry = entries.entry(key).or_insert(Entry {
            failures: 0,
            last_failure: now,
            locked_until: None,
        });
        if entry.is_spent(now) {
            entry.failures = 0;
            entry.locked_until = None;
        }
        entry.failures = entry.failures.saturating_add(1);
        entry.last_failure = now;

        if self.policy.is_exhausted(entry.failures) {
            let duration = self.policy.lockout_duration();
            entry.locked_until = Some(now + duration);
            tracing::warn!(sector = %sector, failures = entry.failures, "Account sign-in locked");
            FailureOutcome::LockedOut {
                remaining_seconds: whole_seconds(duration),
            }
        } else {
            FailureOutcome::Retry {
                remaining_attempts: self.policy.remaining_attempts(entry.failures),
            }
        }
    }

    pub fn record_success(&self, sector: Sector, email: &Email) {
        self.entries.lock().remove(&(sector, email.clone()));
    }

    /// Forget accounts with no live lockout and no failure within `max_idle`.
    /// Returns how many went.
    pub fn prune(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.is_locked(now) || (!entry.is_spent(now) && now - entry.last_failure < max_idle)
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Drop spent entries, then if still full the unlocked entry that failed
/// longest ago. Live lockouts go only when nothing else is left.
fn make_room(entries: &mut HashMap<AccountKey, Entry>, capacity: usize, now: Instant) {
    entries.retain(|_, entry| !entry.is_spent(now));
    if entries.len() < capacity {
        return;
    }

    let oldest = entries
        .iter()
        .filter(|(_, entry)| !entry.is_locked(now))
        .min_by_key(|(_, entry)| entry.last_failure)
        .or_else(|| entries.iter().min_by_key(|(_, entry)| entry.last_failure))
        .map(|(key, _)| key.clone());
    if let Some(key) = oldest {
        entries.remove(&key);
    }
}

fn whole_seconds(duration: Duration) -> u32 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    u32::try_from(secs).unwrap_or(u32::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(s: &str) -> Email {
        Email::new(s).unwrap()
    }

    fn lockouts() -> AccountLockouts {
        AccountLockouts::new(LockoutPolicy::default(), 100)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifth_failure_locks_the_account() {
        let accounts = lockouts();
        let alms = email("alms@example.org");

        for expected in [4, 3, 2, 1] {
            assert_eq!(
                accounts.record_failure(Sector::Charity, &alms),
                FailureOutcome::Retry {
                    remaining_attempts: expected
                }
            );
        }
        assert_eq!(
            accounts.record_failure(Sector::Charity, &alms),
            FailureOutcome::LockedOut { remaining_seconds: 60 }
        );
        assert_eq!(accounts.locked_for(Sector::Charity, &alms), Some(60));
        assert_eq!(accounts.remaining_attempts(Sector::Charity, &alms), 0);

        // Other sectors and other accounts are unaffected
        assert_eq!(accounts.locked_for(Sector::Dawa, &alms), None);
        assert_eq!(accounts.locked_for(Sector::Charity, &email("other@example.org")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_email_case_shares_one_counter() {
        let accounts = lockouts();
        accounts.record_failure(Sector::Qirat, &email("Imam@Example.org"));
        accounts.record_failure(Sector::Qirat, &email("imam@example.org"));
        assert_eq!(accounts.remaining_attempts(Sector::Qirat, &email("IMAM@example.org")), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lockout_forgives_earlier_failures() {
        let accounts = lockouts();
        let alms = email("alms@example.org");
        for _ in 0..5 {
            accounts.record_failure(Sector::Charity, &alms);
        }

        tokio::time::advance(Duration::from_millis(59_500)).await;
        assert_eq!(accounts.locked_for(Sector::Charity, &alms), Some(1));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(accounts.locked_for(Sector::Charity, &alms), None);
        assert_eq!(accounts.remaining_attempts(Sector::Charity, &alms), 5);

        for _ in 0..4 {
            assert!(matches!(
                accounts.record_failure(Sector::Charity, &alms),
                FailureOutcome::Retry { .. }
            ));
        }
        assert!(matches!(
            accounts.record_failure(Sector::Charity, &alms),
            FailureOutcome::LockedOut { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_clears_the_counter() {
        let accounts = lockouts();
        let alms = email("alms@example.org");
        for _ in 0..3 {
            accounts.record_failure(Sector::Charity, &alms);
        }
        accounts.record_success(Sector::Charity, &alms);
        assert!(accounts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_keeps_live_lockouts() {
        let accounts = lockouts();
        let locked = email("locked@example.org");
        for _ in 0..5 {
            accounts.record_failure(Sector::Dawa, &locked);
        }
        accounts.record_failure(Sector::Dawa, &email("typo@example.org"));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(accounts.prune(Duration::from_secs(10)), 1);
        assert_eq!(accounts.locked_for(Sector::Dawa, &locked), Some(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest_unlocked_entry() {
        let accounts = AccountLockouts::new(LockoutPolicy::default(), 2);
        let locked = email("locked@example.org");
        for _ in 0..5 {
            accounts.record_failure(Sector::Academic, &locked);
        }
        tokio::time::advance(Duration::from_secs(1)).await;
        accounts.record_failure(Sector::Academic, &email("first@example.org"));
        tokio::time::advance(Duration::from_secs(1)).await;
        accounts.record_failure(Sector::Academic, &email("second@example.org"));

        assert_eq!(accounts.len(), 2);
        assert!(accounts.locked_for(Sector::Academic, &locked).is_some());
        assert_eq!(accounts.remaining_attempts(Sector::Academic, &email("first@example.org")), 5);
        assert_eq!(accounts.remaining_attempts(Sector::Academic, &email("second@example.org")), 4);
    }
}
