//! Session State
//!
//! Keeps one client's [`Session`] in step with its identity provider. A
//! listener task applies every identity notification in arrival order and
//! publishes the recomputed snapshot on a `watch` channel, so readers never
//! observe a half-updated session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::application::role_resolver::RoleDirectory;
use crate::domain::entity::{Identity, Session};
use crate::domain::provider::{IdentityProvider, IdentityReceiver, OverrideStore};
use crate::domain::value_object::Role;
use crate::error::{GateError, GateResult};

enum Lifecycle {
    Idle,
    Subscribed(JoinHandle<()>),
    TornDown,
}

struct Shared {
    admins: Arc<RoleDirectory>,
    tx: watch::Sender<Session>,
    /// Held from receiving a notification until it is applied. Lock order:
    /// `notifications` before `lifecycle`.
    notifications: Mutex<Option<IdentityReceiver>>,
    lifecycle: Mutex<Lifecycle>,
}

impl Shared {
    /// Recompute and publish the session. Returns false once torn down.
    fn apply(&self, identity: Option<Identity>) -> bool {
        // Held while publishing so teardown cannot interleave with a write
        let lifecycle = self.lifecycle.lock();
        if matches!(*lifecycle, Lifecycle::TornDown) {
            return false;
        }

        let role = identity
            .as_ref()
            .map(|identity| self.admins.resolve(identity.email()))
            .unwrap_or(Role::User);
        let session = Session::resolved(identity, role);

        tracing::debug!(
            role = %session.role(),
            authenticated = session.is_authenticated(),
            "Session updated"
        );
        self.tx.send_replace(session);
        true
    }
}

/// Wait for the next notification and apply it. Ready(false) ends the
/// listener.
fn poll_apply(shared: &Weak<Shared>, cx: &mut Context<'_>) -> Poll<bool> {
    let Some(shared) = shared.upgrade() else {
        return Poll::Ready(false);
    };
    let mut notifications = shared.notifications.lock();
    let Some(receiver) = notifications.as_mut() else {
        return Poll::Ready(false);
    };

    match receiver.poll_recv(cx) {
        Poll::Ready(Some(identity)) => Poll::Ready(shared.apply(identity)),
        Poll::Ready(None) => Poll::Ready(false),
        Poll::Pending => Poll::Pending,
    }
}

pub struct SessionState<P> {
    provider: Arc<P>,
    overrides: Option<Arc<dyn OverrideStore>>,
    /// Set when sign-out could not delete the override; it no longer counts
    override_revoked: AtomicBool,
    shared: Arc<Shared>,
}

impl<P> SessionState<P> {
    /// Stop listening. Idempotent. No notification is applied afterwards.
    pub fn teardown(&self) {
        let previous = std::mem::replace(&mut *self.shared.lifecycle.lock(), Lifecycle::TornDown);
        if let Lifecycle::Subscribed(handle) = previous {
            handle.abort();
            tracing::debug!("Session listener torn down");
        }
        self.shared.notifications.lock().take();
    }

    /// Whether the stored override was revoked by a sign-out that failed to
    /// delete it
    pub fn override_revoked(&self) -> bool {
        self.override_revoked.load(Ordering::Acquire)
    }

    pub(crate) fn clear_override_revocation(&self) {
        self.override_revoked.store(false, Ordering::Release);
    }

    pub fn is_torn_down(&self) -> bool {
        matches!(*self.shared.lifecycle.lock(), Lifecycle::TornDown)
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Session {
        self.shared.tx.borrow().clone()
    }

    /// Receiver that observes every future snapshot
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.shared.tx.subscribe()
    }
}

impl<P> SessionState<P>
where
    P: IdentityProvider + Send + Sync + 'static,
{
    /// Starts in the loading phase. Call [`SessionState::subscribe`] to begin
    /// listening.
    pub fn new(
        provider: Arc<P>,
        admins: Arc<RoleDirectory>,
        overrides: Option<Arc<dyn OverrideStore>>,
    ) -> Self {
        let (tx, _rx) = watch::channel(Session::loading());
        Self {
            provider,
            overrides,
            override_revoked: AtomicBool::new(false),
            shared: Arc::new(Shared {
                admins,
                tx,
                notifications: Mutex::new(None),
                lifecycle: Mutex::new(Lifecycle::Idle),
            }),
        }
    }

    /// Register with the provider. Must run inside a tokio runtime.
    /// Subscribing twice keeps the first listener.
    pub fn subscribe(&self) {
        let mut notifications = self.shared.notifications.lock();
        let mut lifecycle = self.shared.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Subscribed(_) => return,
            Lifecycle::TornDown => {
                tracing::warn!("Ignoring subscribe on a torn down session");
                return;
            }
        }

        *notifications = Some(self.provider.subscribe());
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);

        let handle = tokio::spawn(async move {
            while std::future::poll_fn(|cx| poll_apply(&shared, cx)).await {}
            tracing::trace!("Identity listener finished");
        });

        *lifecycle = Lifecycle::Subscribed(handle);
    }

    /// Wait until `predicate` holds for the session, or give up after
    /// `timeout` with [`GateError::SessionLoading`].
    pub async fn wait_until<F>(&self, timeout: Duration, mut predicate: F) -> GateResult<Session>
    where
        F: FnMut(&Session) -> bool + Send,
    {
        let mut rx = self.shared.tx.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|session| predicate(session))).await {
            Ok(Ok(session)) => Ok(session.clone()),
            Ok(Err(_)) => Err(GateError::Internal("session channel closed".to_string())),
            Err(_) => Err(GateError::SessionLoading),
        }
    }

    /// Wait for the first identity notification
    pub async fn ready(&self, timeout: Duration) -> GateResult<Session> {
        self.wait_until(timeout, Session::is_ready).await
    }

    /// Sign out at the provider, then clear the local override and the
    /// session. A provider failure leaves both untouched.
    ///
    /// Notifications queued before the sign-out are discarded, so none of
    /// them can bring the old identity back. An override that cannot be
    /// deleted is revoked instead and the error is returned.
    pub async fn sign_out(&self) -> GateResult<()> {
        if let Err(e) = self.provider.sign_out().await {
            return Err(e.into());
        }

        let deleted = match &self.overrides {
            Some(store) => store.delete(),
            None => Ok(()),
        };
        if let Err(e) = &deleted {
            self.override_revoked.store(true, Ordering::Release);
            tracing::warn!(error = %e, "Override could not be deleted on sign-out, revoked");
        }

        {
            let mut notifications = self.shared.notifications.lock();
            if let Some(receiver) = notifications.as_mut() {
                let mut discarded = 0usize;
                while receiver.try_recv().is_ok() {
                    discarded += 1;
                }
                if discarded > 0 {
                    tracing::debug!(discarded, "Dropped identity notifications queued before sign-out");
                }
            }
            self.shared.apply(None);
        }

        deleted?;
        tracing::info!("Signed out");
        Ok(())
    }
}

impl<P> Drop for SessionState<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::LocalOverride;
    use crate::domain::value_object::Email;
    use crate::infra::memory::{InMemoryIdentityDirectory, InMemoryIdentityProvider, MemoryOverrideStore};

    const WAIT: Duration = Duration::from_secs(5);

    struct Fixture {
        provider: Arc<InMemoryIdentityProvider>,
        store: Arc<MemoryOverrideStore>,
        state: SessionState<InMemoryIdentityProvider>,
    }

    fn fixture_with(provider: InMemoryIdentityProvider) -> Fixture {
        let admins = RoleDirectory::from_entries([("alms@example.org", Role::CharityAmir)]).unwrap();
        let provider = Arc::new(provider);
        let store = Arc::new(MemoryOverrideStore::new());
        let state = SessionState::new(
            provider.clone(),
            Arc::new(admins),
            Some(store.clone() as Arc<dyn OverrideStore>),
        );
        Fixture { provider, store, state }
    }

    fn directory() -> Arc<InMemoryIdentityDirectory> {
        let directory = InMemoryIdentityDirectory::new();
        directory.add_account("alms@example.org", "pw").unwrap();
        directory.add_account("plain@example.org", "pw").unwrap();
        Arc::new(directory)
    }

    fn fixture() -> Fixture {
        fixture_with(InMemoryIdentityProvider::new(directory()))
    }

    async fn sign_in(provider: &InMemoryIdentityProvider, email: &str) -> Identity {
        provider
            .sign_in(&Email::new(email).unwrap(), "pw")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_starts_loading() {
        let f = fixture();
        let session = f.state.snapshot();
        assert!(session.is_loading());
        assert!(!session.is_authenticated());
        assert_eq!(session.role(), Role::User);
    }

    #[tokio::test]
    async fn test_first_notification_makes_ready() {
        let f = fixture();
        f.state.subscribe();
        let session = f.state.ready(WAIT).await.unwrap();
        assert!(session.is_ready());
        assert!(!session.is_authenticated());
        assert!(!session.is_admin());
    }

    #[tokio::test]
    async fn test_admin_identity_gets_role() {
        let f = fixture();
        f.state.subscribe();
        sign_in(&f.provider, "alms@example.org").await;

        let session = f.state.wait_until(WAIT, Session::is_authenticated).await.unwrap();
        assert_eq!(session.role(), Role::CharityAmir);
        assert!(session.is_admin());
        assert_eq!(session.email(), Some("alms@example.org"));
    }

    #[tokio::test]
    async fn test_non_admin_identity_is_user() {
        let f = fixture();
        f.state.subscribe();
        sign_in(&f.provider, "plain@example.org").await;

        let session = f.state.wait_until(WAIT, Session::is_authenticated).await.unwrap();
        assert_eq!(session.role(), Role::User);
        assert!(!session.is_admin());
    }

    #[tokio::test]
    async fn test_external_identity_loss_signs_out() {
        let f = fixture();
        f.state.subscribe();
        sign_in(&f.provider, "alms@example.org").await;
        f.state.wait_until(WAIT, Session::is_authenticated).await.unwrap();

        f.provider.force_identity(None);
        let session = f
            .state
            .wait_until(WAIT, |s| !s.is_authenticated())
            .await
            .unwrap();
        assert_eq!(session, Session::signed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_provider_times_out() {
        let f = fixture_with(InMemoryIdentityProvider::deferred(directory()));
        f.state.subscribe();

        let result = f.state.ready(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(GateError::SessionLoading)));
        assert!(f.state.snapshot().is_loading());

        f.provider.announce();
        assert!(f.state.ready(WAIT).await.unwrap().is_ready());
    }

    #[tokio::test]
    async fn test_teardown_stops_updates() {
        let f = fixture();
        f.state.subscribe();
        f.state.ready(WAIT).await.unwrap();

        f.state.teardown();
        f.state.teardown();
        assert!(f.state.is_torn_down());

        sign_in(&f.provider, "alms@example.org").await;
        tokio::task::yield_now().await;
        assert!(!f.state.snapshot().is_authenticated());

        // Subscribing again does nothing
        f.state.subscribe();
        assert!(f.state.is_torn_down());
    }

    #[tokio::test]
    async fn test_sign_out_clears_session_and_override() {
        let f = fixture();
        f.state.subscribe();
        sign_in(&f.provider, "alms@example.org").await;
        f.state.wait_until(WAIT, Session::is_authenticated).await.unwrap();
        f.store
            .write(&LocalOverride::new(Role::SuperAdmin, "dev@example.org"))
            .unwrap();

        f.state.sign_out().await.unwrap();

        assert_eq!(f.state.snapshot(), Session::signed_out());
        assert_eq!(f.store.read().unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_sign_out_changes_nothing() {
        let f = fixture();
        f.state.subscribe();
        sign_in(&f.provider, "alms@example.org").await;
        let before = f.state.wait_until(WAIT, Session::is_authenticated).await.unwrap();
        let record = LocalOverride::new(Role::SuperAdmin, "dev@example.org");
        f.store.write(&record).unwrap();

        f.provider.set_sign_out_failure(true);
        let result = f.state.sign_out().await;

        assert!(matches!(result, Err(GateError::SignOut(_))));
        assert_eq!(f.state.snapshot(), before);
        assert_eq!(f.store.read().unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_override_delete_failure_is_reported() {
        let f = fixture();
        f.state.subscribe();
        sign_in(&f.provider, "alms@example.org").await;
        f.state.wait_until(WAIT, Session::is_authenticated).await.unwrap();

        f.store.set_failing(true);
        let result = f.state.sign_out().await;

        assert!(matches!(result, Err(GateError::OverrideStore(_))));
        assert!(!f.state.snapshot().is_authenticated());
        assert!(f.state.override_revoked());
    }

    #[tokio::test]
    async fn test_identity_queued_before_sign_out_is_not_applied() {
        let f = fixture();
        f.state.subscribe();
        f.state.ready(WAIT).await.unwrap();

        // Published but not yet picked up by the listener
        sign_in(&f.provider, "alms@example.org").await;
        f.state.sign_out().await.unwrap();

        let mut rx = f.state.watch();
        assert_eq!(*rx.borrow_and_update(), Session::signed_out());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!rx.has_changed().unwrap());
        assert_eq!(f.state.snapshot(), Session::signed_out());

        // Later notifications still arrive
        sign_in(&f.provider, "alms@example.org").await;
        let session = f.state.wait_until(WAIT, Session::is_authenticated).await.unwrap();
        assert_eq!(session.role(), Role::CharityAmir);
    }

    #[tokio::test]
    async fn test_watch_sees_transitions() {
        let f = fixture();
        let mut rx = f.state.watch();
        f.state.subscribe();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_ready());
    }
}
