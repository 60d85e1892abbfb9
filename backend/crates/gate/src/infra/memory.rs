//! In-Memory Implementations
//!
//! Identity provider and override slot backed by process memory. Used for
//! local development and throughout the test suite.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use super::broadcast::IdentityBroadcast;

use crate::domain::entity::{Identity, LocalOverride};
use crate::domain::provider::{IdentityError, IdentityProvider, IdentityReceiver, OverrideStore};
use crate::domain::value_object::Email;
use crate::error::{GateError, GateResult};

// ============================================================================
// Account directory
// ============================================================================

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    email: String,
    password: String,
}

/// Shared account table behind every [`InMemoryIdentityProvider`]
#[derive(Debug, Default)]
pub struct InMemoryIdentityDirectory {
    accounts: RwLock<HashMap<String, Account>>,
}

impl InMemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `email:password` pairs separated by commas or newlines
    pub fn parse(raw: &str) -> GateResult<Self> {
        let directory = Self::new();
        for pair in raw.split([',', '\n']).map(str::trim).filter(|p| !p.is_empty()) {
            let (email, password) = pair.split_once(':').ok_or_else(|| {
                GateError::Config(format!("account entry '{pair}' is not email:password"))
            })?;
            directory.add_account(email.trim(), password)?;
        }
        Ok(directory)
    }

    /// Register an account. Re-registering an email replaces its password
    /// and keeps the uid.
    pub fn add_account(&self, email: &str, password: &str) -> GateResult<Identity> {
        let email = Email::new(email).map_err(|e| GateError::Config(e.message().to_string()))?;

        let mut accounts = self.accounts.write();
        let account = accounts
            .entry(email.as_str().to_string())
            .and_modify(|account| account.password = password.to_string())
            .or_insert_with(|| Account {
                uid: format!("mem-{}", Uuid::new_v4().simple()),
                email: email.as_str().to_string(),
                password: password.to_string(),
            });

        Ok(Identity::with_email(account.uid.clone(), account.email.clone()))
    }

    pub fn remove_account(&self, email: &str) -> bool {
        self.accounts.write().remove(&email.to_lowercase()).is_some()
    }

    fn verify(&self, email: &Email, password: &str) -> Option<Identity> {
        let accounts = self.accounts.read();
        let account = accounts.get(email.as_str())?;
        let matches = platform::crypto::constant_time_eq(account.password.as_bytes(), password.as_bytes());
        matches.then(|| Identity::with_email(account.uid.clone(), account.email.clone()))
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }
}

// ============================================================================
// Identity provider
// ============================================================================

#[derive(Debug, Default)]
struct ProviderState {
    broadcast: IdentityBroadcast,
    network_down: bool,
    fail_sign_out: bool,
    latency: Option<Duration>,
    sign_in_calls: u32,
}

/// One client's view of the in-memory identity service
#[derive(Debug)]
pub struct InMemoryIdentityProvider {
    directory: Arc<InMemoryIdentityDirectory>,
    state: Mutex<ProviderState>,
    /// Whether a new subscriber receives the current identity immediately
    announce_on_subscribe: bool,
}

impl InMemoryIdentityProvider {
    pub fn new(directory: Arc<InMemoryIdentityDirectory>) -> Self {
        Self {
            directory,
            state: Mutex::new(ProviderState::default()),
            announce_on_subscribe: true,
        }
    }

    /// Provider that stays silent until [`InMemoryIdentityProvider::announce`]
    /// is called, like a remote service still restoring its session.
    pub fn deferred(directory: Arc<InMemoryIdentityDirectory>) -> Self {
        Self {
            announce_on_subscribe: false,
            ..Self::new(directory)
        }
    }

    /// Send the current identity to every subscriber
    pub fn announce(&self) {
        self.state.lock().broadcast.announce();
    }

    /// Replace the identity from outside a sign-in, e.g. an expired or
    /// revoked provider session.
    pub fn force_identity(&self, identity: Option<Identity>) {
        self.publish(identity);
    }

    pub fn current(&self) -> Option<Identity> {
        self.state.lock().broadcast.current().cloned()
    }

    /// Make sign-in fail with a network error
    pub fn set_network_down(&self, down: bool) {
        self.state.lock().network_down = down;
    }

    pub fn set_sign_out_failure(&self, fail: bool) {
        self.state.lock().fail_sign_out = fail;
    }

    /// Delay every sign-in answer
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().latency = latency;
    }

    /// Number of sign-in requests that reached the provider
    pub fn sign_in_calls(&self) -> u32 {
        self.state.lock().sign_in_calls
    }

    fn publish(&self, identity: Option<Identity>) {
        self.state.lock().broadcast.publish(identity);
    }
}

impl IdentityProvider for InMemoryIdentityProvider {
    async fn sign_in(&self, email: &Email, password: &str) -> Result<Identity, IdentityError> {
        let latency = {
            let mut state = self.state.lock();
            state.sign_in_calls += 1;
            state.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let network_down = self.state.lock().network_down;
        if network_down {
            return Err(IdentityError::Network("identity service unreachable".to_string()));
        }

        let identity = self
            .directory
            .verify(email, password)
            .ok_or(IdentityError::InvalidCredentials)?;

        self.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        let fail = self.state.lock().fail_sign_out;
        if fail {
            return Err(IdentityError::SignOut("identity service refused sign-out".to_string()));
        }

        self.publish(None);
        Ok(())
    }

    fn subscribe(&self) -> IdentityReceiver {
        self.state.lock().broadcast.subscribe(self.announce_on_subscribe)
    }
}

// ============================================================================
// Override slot
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryOverrideStore {
    slot: Mutex<Option<LocalOverride>>,
    failing: Mutex<bool>,
}

impl MemoryOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: LocalOverride) -> Self {
        Self {
            slot: Mutex::new(Some(record)),
            ..Self::default()
        }
    }

    /// Make every operation fail, as an unavailable storage would
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    fn check(&self) -> GateResult<()> {
        if *self.failing.lock() {
            return Err(GateError::OverrideStore("storage unavailable".to_string()));
        }
        Ok(())
    }
}

impl OverrideStore for MemoryOverrideStore {
    fn read(&self) -> GateResult<Option<LocalOverride>> {
        self.check()?;
        Ok(self.slot.lock().clone())
    }

    fn write(&self, record: &LocalOverride) -> GateResult<()> {
        self.check()?;
        *self.slot.lock() = Some(record.clone());
        Ok(())
    }

    fn delete(&self) -> GateResult<()> {
        self.check()?;
        self.slot.lock().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_object::Role;

    fn directory() -> Arc<InMemoryIdentityDirectory> {
        let directory = InMemoryIdentityDirectory::new();
        directory.add_account("alms@example.org", "correct horse").unwrap();
        Arc::new(directory)
    }

    fn email(s: &str) -> Email {
        Email::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_sign_in_publishes_identity() {
        let provider = InMemoryIdentityProvider::new(directory());
        let mut rx = provider.subscribe();
        assert_eq!(rx.recv().await, Some(None));

        let identity = provider
            .sign_in(&email("ALMS@example.org"), "correct horse")
            .await
            .unwrap();
        assert_eq!(identity.email(), Some("alms@example.org"));
        assert_eq!(rx.recv().await, Some(Some(identity)));
        assert_eq!(provider.sign_in_calls(), 1);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_look_the_same() {
        let provider = InMemoryIdentityProvider::new(directory());
        let wrong = provider.sign_in(&email("alms@example.org"), "nope").await;
        let unknown = provider.sign_in(&email("nobody@example.org"), "nope").await;
        assert_eq!(wrong, Err(IdentityError::InvalidCredentials));
        assert_eq!(unknown, Err(IdentityError::InvalidCredentials));
        assert!(provider.current().is_none());
    }

    #[tokio::test]
    async fn test_network_down() {
        let provider = InMemoryIdentityProvider::new(directory());
        provider.set_network_down(true);
        let result = provider.sign_in(&email("alms@example.org"), "correct horse").await;
        assert!(matches!(result, Err(IdentityError::Network(_))));
    }

    #[tokio::test]
    async fn test_deferred_provider_stays_silent() {
        let provider = InMemoryIdentityProvider::deferred(directory());
        let mut rx = provider.subscribe();
        assert!(rx.try_recv().is_err());
        provider.announce();
        assert_eq!(rx.recv().await, Some(None));
    }

    #[tokio::test]
    async fn test_sign_out_failure_keeps_identity() {
        let provider = InMemoryIdentityProvider::new(directory());
        provider
            .sign_in(&email("alms@example.org"), "correct horse")
            .await
            .unwrap();
        provider.set_sign_out_failure(true);
        assert!(provider.sign_out().await.is_err());
        assert!(provider.current().is_some());

        provider.set_sign_out_failure(false);
        provider.sign_out().await.unwrap();
        assert!(provider.current().is_none());
    }

    #[test]
    fn test_parse_accounts() {
        let directory = InMemoryIdentityDirectory::parse("a@example.org:one, b@example.org:two").unwrap();
        assert_eq!(directory.len(), 2);
        assert!(InMemoryIdentityDirectory::parse("a@example.org").is_err());
    }

    #[test]
    fn test_override_store() {
        let store = MemoryOverrideStore::new();
        assert_eq!(store.read().unwrap(), None);

        let record = LocalOverride::new(Role::QiratAmir, "dev@example.org");
        store.write(&record).unwrap();
        assert_eq!(store.read().unwrap(), Some(record));

        store.delete().unwrap();
        store.delete().unwrap();
        assert_eq!(store.read().unwrap(), None);

        store.set_failing(true);
        assert!(matches!(store.read(), Err(GateError::OverrideStore(_))));
    }
}
