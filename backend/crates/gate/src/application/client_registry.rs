//! Client Registry
//!
//! Per-browser gate state for the server. Each client context owns its own
//! identity provider handle, session, sector login gates and override slot,
//! and is addressed by a signed cookie bound to the browser fingerprint.
//! The number of live contexts is capped; the least recently seen goes first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use kernel::id::ClientId;
use parking_lot::{Mutex, RwLock};
use platform::client::ClientFingerprint;

use crate::application::account_lockout::AccountLockouts;
use crate::application::client_token::ClientTokenSigner;
use crate::application::config::GateConfig;
use crate::application::login_gate::LoginGate;
use crate::application::session_state::SessionState;
use crate::domain::entity::LocalOverride;
use crate::domain::provider::{IdentityProvider, OverrideStore};
use crate::domain::value_object::Sector;
use crate::error::GateResult;

/// Builds a fresh provider handle for a new client
pub type ProviderFactory<P> = Arc<dyn Fn() -> P + Send + Sync>;

/// Opens the override slot belonging to a client
pub type OverrideSlotFactory = Arc<dyn Fn(&ClientId) -> Arc<dyn OverrideStore> + Send + Sync>;

/// One login gate per sector
pub struct SectorGates<P> {
    charity: LoginGate<P>,
    academic: LoginGate<P>,
    qirat: LoginGate<P>,
    dawa: LoginGate<P>,
}

impl<P> SectorGates<P> {
    pub fn get(&self, sector: Sector) -> &LoginGate<P> {
        match sector {
            Sector::Charity => &self.charity,
            Sector::Academic => &self.academic,
            Sector::Qirat => &self.qirat,
            Sector::Dawa => &self.dawa,
        }
    }

    fn shutdown(&self) {
        for sector in Sector::ALL {
            self.get(sector).shutdown();
        }
    }
}

pub struct ClientContext<P> {
    id: ClientId,
    fingerprint: [u8; 32],
    session: SessionState<P>,
    gates: SectorGates<P>,
    overrides: Option<Arc<dyn OverrideStore>>,
    override_ttl: Option<Duration>,
    last_seen: Mutex<Instant>,
}

impl<P> ClientContext<P>
where
    P: IdentityProvider + Send + Sync + 'static,
{
    fn new(
        id: ClientId,
        fingerprint: [u8; 32],
        provider: P,
        config: &GateConfig,
        accounts: &Arc<AccountLockouts>,
        overrides: Option<Arc<dyn OverrideStore>>,
    ) -> Self {
        let provider = Arc::new(provider);
        let session = SessionState::new(provider.clone(), config.admins.clone(), overrides.clone());
        session.subscribe();

        let gate = |sector| LoginGate::with_account_lockouts(sector, provider.clone(), accounts.clone());
        let gates = SectorGates {
            charity: gate(Sector::Charity),
            academic: gate(Sector::Academic),
            qirat: gate(Sector::Qirat),
            dawa: gate(Sector::Dawa),
        };

        Self {
            id,
            fingerprint,
            session,
            gates,
            overrides,
            override_ttl: config.override_ttl,
            last_seen: Mutex::new(Instant::now()),
        }
    }
}

impl<P> ClientContext<P> {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn session(&self) -> &SessionState<P> {
        &self.session
    }

    pub fn gate(&self, sector: Sector) -> &LoginGate<P> {
        self.gates.get(sector)
    }

    pub fn override_store(&self) -> Option<&Arc<dyn OverrideStore>> {
        self.overrides.as_ref()
    }

    /// The stored override, unless it is missing, expired, unreadable or
    /// revoked by sign-out. Expired and revoked records are removed from the
    /// slot.
    pub fn effective_override(&self) -> Option<LocalOverride> {
        let store = self.overrides.as_ref()?;
        if self.session.override_revoked() {
            match store.delete() {
                Ok(()) => {
                    self.session.clear_override_revocation();
                    tracing::info!(client = %self.id, "Revoked override removed");
                }
                Err(e) => tracing::warn!(client = %self.id, error = %e, "Revoked override still present"),
            }
            return None;
        }

        let record = match store.read() {
            Ok(record) => record?,
            Err(e) => {
                tracing::warn!(client = %self.id, error = %e, "Override slot unreadable, ignoring");
                return None;
            }
        };

        if record.is_expired(self.override_ttl, Utc::now()) {
            tracing::info!(client = %self.id, role = %record.role, "Local override expired");
            if let Err(e) = store.delete() {
                tracing::warn!(client = %self.id, error = %e, "Failed to remove expired override");
            }
            return None;
        }

        Some(record)
    }

    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    fn fingerprint_matches(&self, fingerprint: &ClientFingerprint) -> bool {
        fingerprint.matches(&self.fingerprint)
    }

    fn teardown(&self) {
        self.session.teardown();
        self.gates.shutdown();
    }
}

/// Result of [`ClientRegistry::resolve`]
pub struct ResolvedClient<P> {
    pub context: Arc<ClientContext<P>>,
    /// Set when a new context was created and the cookie must be (re)issued
    pub issued_token: Option<String>,
}

pub struct ClientRegistry<P> {
    config: Arc<GateConfig>,
    signer: ClientTokenSigner,
    provider_factory: ProviderFactory<P>,
    override_factory: Option<OverrideSlotFactory>,
    accounts: Arc<AccountLockouts>,
    clients: RwLock<HashMap<ClientId, Arc<ClientContext<P>>>>,
}

impl<P> ClientRegistry<P>
where
    P: IdentityProvider + Send + Sync + 'static,
{
    pub fn new(config: Arc<GateConfig>, provider_factory: ProviderFactory<P>) -> Self {
        Self {
            signer: ClientTokenSigner::new(config.client_secret),
            config: config.clone(),
            provider_factory,
            override_factory: None,
            accounts: Arc::new(AccountLockouts::new(config.lockout, config.max_tracked_accounts)),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Give every client an override slot. Without this, overrides are
    /// never consulted.
    pub fn with_override_slots(mut self, factory: OverrideSlotFactory) -> Self {
        self.override_factory = Some(factory);
        self
    }

    /// Create a new client context and its cookie token
    pub fn create(&self, fingerprint: &ClientFingerprint) -> GateResult<(Arc<ClientContext<P>>, String)> {
        let id = ClientId::new();
        let token = self.signer.issue(&id)?;
        let overrides = self.override_factory.as_ref().map(|factory| factory(&id));
        let context = Arc::new(ClientContext::new(
            id,
            fingerprint.hash,
            (self.provider_factory)(),
            &self.config,
            &self.accounts,
            overrides,
        ));

        let displaced = {
            let mut clients = self.clients.write();
            let displaced = if clients.len() >= self.config.max_clients.max(1) {
                least_recently_seen(&clients).and_then(|oldest| clients.remove(&oldest))
            } else {
                None
            };
            clients.insert(id, context.clone());
            displaced
        };
        tracing::debug!(client = %id, fingerprint = %fingerprint.short_hash(), "Client context created");

        if let Some(old) = displaced {
            old.teardown();
            tracing::info!(client = %old.id(), idle = ?old.idle_for(), "Client limit reached, displaced the least recent");
        }

        Ok((context, token))
    }

    /// Find the context named by `token`. Forged tokens, unknown ids and
    /// fingerprint mismatches all yield `None`.
    pub fn lookup(&self, token: &str, fingerprint: &ClientFingerprint) -> Option<Arc<ClientContext<P>>> {
        let id = self.signer.verify(token)?;
        let context = self.clients.read().get(&id).cloned()?;

        if !context.fingerprint_matches(fingerprint) {
            tracing::warn!(
                client = %id,
                fingerprint = %fingerprint.short_hash(),
                "Client token presented from a different browser"
            );
            return None;
        }

        context.touch();
        Some(context)
    }

    /// Look up the client, or start a new one when the token is absent or
    /// no longer valid.
    pub fn resolve(&self, token: Option<&str>, fingerprint: &ClientFingerprint) -> GateResult<ResolvedClient<P>> {
        if let Some(context) = token.and_then(|token| self.lookup(token, fingerprint)) {
            return Ok(ResolvedClient {
                context,
                issued_token: None,
            });
        }

        let (context, token) = self.create(fingerprint)?;
        Ok(ResolvedClient {
            context,
            issued_token: Some(token),
        })
    }
}

impl<P> ClientRegistry<P> {
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn account_lockouts(&self) -> &AccountLockouts {
        &self.accounts
    }

    pub fn remove(&self, id: &ClientId) -> bool {
        let removed = self.clients.write().remove(id);
        match removed {
            Some(context) => {
                context.teardown();
                true
            }
            None => false,
        }
    }

    /// Drop contexts idle for longer than `max_idle`. Returns how many went.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let evicted: Vec<Arc<ClientContext<P>>> = {
            let mut clients = self.clients.write();
            let stale: Vec<ClientId> = clients
                .iter()
                .filter(|(_, context)| context.idle_for() >= max_idle)
                .map(|(id, _)| *id)
                .collect();
            stale.iter().filter_map(|id| clients.remove(id)).collect()
        };

        for context in &evicted {
            context.teardown();
        }
        if !evicted.is_empty() {
            tracing::info!(clients_evicted = evicted.len(), "Evicted idle client contexts");
        }

        let forgotten = self.accounts.prune(max_idle);
        if forgotten > 0 {
            tracing::debug!(accounts_forgotten = forgotten, "Pruned stale account failure counts");
        }
        evicted.len()
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}

fn least_recently_seen<P>(clients: &HashMap<ClientId, Arc<ClientContext<P>>>) -> Option<ClientId> {
    clients
        .iter()
        .max_by_key(|(_, context)| context.idle_for())
        .map(|(id, _)| *id)
}
